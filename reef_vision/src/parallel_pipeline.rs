// THEORY:
// Rectifying one image is a pure function, so a batch of images is embarrassingly
// parallel. This module is the batch layer around the pure core: it enumerates a
// directory, hands each file to a pool of workers, and collects one outcome per
// input, in input order.
//
// Key architectural principles:
// 1.  **Work Queue**: A single dispatcher task receives jobs on an unbounded channel
//     and deals them round-robin to the workers. Each job carries its own oneshot
//     reply channel, so results are attributed to the right input without any
//     shared result map.
// 2.  **Blocking Work Off the Reactor**: Decoding, the four stages and encoding are
//     CPU-bound. Workers run them on tokio's blocking pool and only await the result.
// 3.  **Per-Image Isolation**: A failing image produces a failed outcome and an error
//     log line; the batch carries on with the next file. Only problems with the batch
//     itself (missing input directory, unwritable output directory) abort it.

use crate::core_modules::utils::image_helper::image_helper::{
    collect_images, load, output_path_for, save,
};
use crate::error::{RectifyError, Result};
use crate::pipeline::{PipelineConfig, RectifyPipeline, RectifyReport};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// The result of rectifying a single file.
#[derive(Debug)]
pub struct ImageOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub result: Result<RectifyReport>,
}

impl ImageOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-file outcomes of a batch run, in input order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<ImageOutcome>,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.processed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ImageOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }
}

pub struct ImageJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub result_sender: oneshot::Sender<Result<RectifyReport>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<ImageJob>,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers sharing one pipeline. Must be called inside a tokio runtime.
    pub fn new(pipeline: Arc<RectifyPipeline>, size: usize) -> Self {
        let size = size.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ImageJob>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..size)
            .map(|_| mpsc::unbounded_channel::<ImageJob>())
            .unzip();

        // Spawn dispatcher
        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(job) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(job)) = worker_senders[worker_idx].send(job) {
                    let _ = job
                        .result_sender
                        .send(Err(RectifyError::WorkerPool("worker exited early".into())));
                }
                worker_idx = (worker_idx + 1) % size;
            }
        });

        // Spawn workers
        let workers = worker_receivers
            .into_iter()
            .map(|mut worker_receiver| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    while let Some(job) = worker_receiver.recv().await {
                        let ImageJob { input, output, result_sender } = job;
                        let result = Self::process_job(Arc::clone(&pipeline), input.clone(), output).await;
                        log_outcome(&input, &result);
                        let _ = result_sender.send(result);
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            dispatcher,
            workers,
        }
    }

    async fn process_job(
        pipeline: Arc<RectifyPipeline>,
        input: PathBuf,
        output: PathBuf,
    ) -> Result<RectifyReport> {
        tokio::task::spawn_blocking(move || rectify_file(&pipeline, &input, &output))
            .await
            .map_err(|join_error| RectifyError::WorkerPool(join_error.to_string()))?
    }

    /// Queues one file and returns the channel its result will arrive on.
    pub fn submit(
        &self,
        input: PathBuf,
        output: PathBuf,
    ) -> Result<oneshot::Receiver<Result<RectifyReport>>> {
        let (result_sender, result_receiver) = oneshot::channel();
        let job = ImageJob {
            input,
            output,
            result_sender,
        };

        self.task_sender
            .send(job)
            .map_err(|_| RectifyError::WorkerPool("failed to send job to worker pool".into()))?;

        Ok(result_receiver)
    }

    /// Closes the queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        let _ = self.dispatcher.await;
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Load, rectify and save a single file. Runs on a blocking thread.
pub fn rectify_file(pipeline: &RectifyPipeline, input: &Path, output: &Path) -> Result<RectifyReport> {
    let image = load(input)?;
    let (rectified, report) = pipeline.rectify_with_report(&image)?;
    if !report.degenerate_channels.is_empty() {
        tracing::debug!(
            file = %input.display(),
            channels = ?report.degenerate_channels,
            "constant channels left unstretched"
        );
    }
    save(output, &rectified)?;
    Ok(report)
}

/// Reports one finished file as soon as it completes.
fn log_outcome<T>(input: &Path, result: &Result<T>) {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    match result {
        Ok(_) => tracing::info!("Processed and saved: {name}"),
        Err(error) => tracing::error!("Error processing {name}: {error}"),
    }
}

/// Runs a whole directory (or an explicit file list) through the rectification pipeline.
pub struct BatchProcessor {
    pipeline: Arc<RectifyPipeline>,
    workers: usize,
}

impl BatchProcessor {
    /// `workers == 0` picks one worker per logical CPU.
    pub fn new(config: PipelineConfig, workers: usize) -> Result<Self> {
        let workers = if workers == 0 { num_cpus::get().max(1) } else { workers };
        Ok(Self {
            pipeline: Arc::new(RectifyPipeline::new(config)?),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchSummary> {
        let paths = collect_images(input_dir)?;
        tracing::info!(
            input = %input_dir.display(),
            images = paths.len(),
            workers = self.workers,
            "starting batch"
        );
        tracing::debug!(config = ?self.pipeline.config(), "pipeline settings");
        self.process_paths(paths, output_dir).await
    }

    pub async fn process_paths(&self, paths: Vec<PathBuf>, output_dir: &Path) -> Result<BatchSummary> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| RectifyError::Io {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let pool = WorkerPool::new(Arc::clone(&self.pipeline), self.workers);

        let mut pending = Vec::with_capacity(paths.len());
        for input in paths {
            match output_path_for(&input, output_dir) {
                Ok(output) => {
                    let receiver = pool.submit(input.clone(), output.clone());
                    pending.push((input, output, Some(receiver)));
                }
                Err(error) => {
                    let submission = Err(error);
                    log_outcome(&input, &submission);
                    pending.push((input, PathBuf::new(), Some(submission)));
                }
            }
        }

        let waits = pending.iter_mut().map(|(_, _, submission)| {
            let submission = submission.take();
            async move {
                match submission {
                    Some(Ok(receiver)) => receiver.await.unwrap_or_else(|_| {
                        Err(RectifyError::WorkerPool("worker dropped the job".into()))
                    }),
                    Some(Err(error)) => Err(error),
                    None => Err(RectifyError::WorkerPool("job submitted twice".into())),
                }
            }
        });
        let results = join_all(waits).await;
        pool.shutdown().await;

        let outcomes: Vec<ImageOutcome> = pending
            .into_iter()
            .zip(results)
            .map(|((input, output, _), result)| ImageOutcome { input, output, result })
            .collect();

        Ok(BatchSummary { outcomes })
    }
}
