// THEORY:
// A single error type for the whole engine. The core stages only ever produce
// `InvalidImage` and `InvalidConfig`; the remaining variants belong to the I/O
// helpers and the batch layer, which wrap the core without changing its contract.
//
// Degenerate (constant) channels are deliberately absent: the color balancer
// resolves them in-line and reports them through `RectifyReport` instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RectifyError {
    /// The input cannot be interpreted as a non-empty 3-channel 8-bit image.
    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    /// The decoder could not read or decode the file at `path`.
    #[error("invalid image at {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The encoder could not persist the result to `path`.
    #[error("failed to encode image to {}: {source}", path.display())]
    EncodingFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("worker pool failure: {0}")]
    WorkerPool(String),
}

impl RectifyError {
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage { reason: reason.into() }
    }

    /// True for every flavour of "this input is not a usable image".
    pub fn is_invalid_image(&self) -> bool {
        matches!(self, Self::InvalidImage { .. } | Self::Decode { .. })
    }
}

pub type Result<T> = std::result::Result<T, RectifyError>;
