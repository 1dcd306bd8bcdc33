// THEORY:
// This file is the main entry point for the `reef_vision` library crate.
// It exposes the rectification engine for underwater photographs: a fixed,
// four-stage pipeline (color balance, lightness CLAHE, red-channel gain, fusion)
// behind `RectifyPipeline`, plus a parallel batch layer for whole directories.
//
// The primary goal is to keep the stages pure and independently testable inside
// `core_modules`, while `pipeline` and `parallel_pipeline` provide the clean,
// high-level interface consumed by front ends such as `reef_batch`.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{RectifyError, Result};
pub use parallel_pipeline::{BatchProcessor, BatchSummary, ImageOutcome};
pub use pipeline::{PipelineConfig, RectifyPipeline, RectifyReport, rectify};
