use anyhow::{Context, bail};
use clap::Parser;
use reef_vision::core_modules::contrast_enhancer::ClaheParams;
use reef_vision::core_modules::fusion::FusionWeights;
use reef_vision::{BatchProcessor, PipelineConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Restores color and contrast in every underwater photo found in a directory.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the raw photos (.png .jpg .jpeg .bmp .tiff).
    input_dir: PathBuf,

    /// Directory receiving the restored photos, created if missing.
    output_dir: PathBuf,

    /// Percentile clipped off each end of every channel before stretching.
    #[arg(long, default_value_t = 1.0)]
    percent: f64,

    /// CLAHE tile grid, as COLUMNSxROWS; each side between 1 and 256.
    #[arg(long, default_value = "8x8", value_parser = parse_tiles)]
    tiles: (u32, u32),

    /// CLAHE contrast ceiling; 0 disables clipping.
    #[arg(long, default_value_t = 3.0)]
    clip_limit: f64,

    /// Gain applied to the red channel.
    #[arg(long, default_value_t = 1.3)]
    red_gain: f64,

    /// Fusion weight of the untouched input.
    #[arg(long, default_value_t = 0.4)]
    weight_original: f32,

    /// Fusion weight of the enhanced image. Defaults to 1 - weight-original.
    #[arg(long)]
    weight_enhanced: Option<f32>,

    /// Number of worker tasks; 0 uses one per logical CPU.
    #[arg(short, long, default_value_t = 0)]
    workers: usize,

    /// Log per-stage detail (equivalent to RUST_LOG=debug).
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let (tiles_x, tiles_y) = self.tiles;
        PipelineConfig {
            balance_percent: self.percent,
            clahe: ClaheParams {
                tiles_x,
                tiles_y,
                clip_limit: self.clip_limit,
            },
            red_gain: self.red_gain,
            fusion: FusionWeights {
                original: self.weight_original,
                enhanced: self.weight_enhanced.unwrap_or(1.0 - self.weight_original),
            },
        }
    }
}

fn parse_tiles(value: &str) -> Result<(u32, u32), String> {
    let (columns, rows) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected COLUMNSxROWS, got `{value}`"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|error| format!("invalid tile count `{part}`: {error}"))
    };
    Ok((parse(columns)?, parse(rows)?))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.input_dir.is_dir() {
        bail!("input directory {} does not exist", args.input_dir.display());
    }

    let processor = BatchProcessor::new(args.pipeline_config(), args.workers)
        .context("invalid pipeline settings")?;
    let summary = processor
        .process_directory(&args.input_dir, &args.output_dir)
        .await
        .with_context(|| format!("batch over {} failed", args.input_dir.display()))?;

    tracing::info!(
        processed = summary.processed(),
        failed = summary.failed(),
        "Processing complete. Output saved to {}",
        args.output_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_grid_parses_both_separators() {
        assert_eq!(parse_tiles("8x8"), Ok((8, 8)));
        assert_eq!(parse_tiles("4X2"), Ok((4, 2)));
        assert!(parse_tiles("8").is_err());
        assert!(parse_tiles("ax8").is_err());
    }

    #[test]
    fn defaults_match_library_defaults() {
        let args = Args::parse_from(["reef_batch", "in", "out"]);
        assert_eq!(args.pipeline_config(), PipelineConfig::default());
    }

    #[test]
    fn enhanced_weight_follows_original_weight() {
        let args = Args::parse_from(["reef_batch", "in", "out", "--weight-original", "0.25"]);
        let config = args.pipeline_config();
        assert_eq!(config.fusion.enhanced, 0.75);
        assert!(config.validate().is_ok());
    }
}
