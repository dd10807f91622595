use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the detection pipeline.
///
/// An empty detection outcome is not an error; it travels as `None` through
/// the resolver and postprocessor and ends up as a zero-count report.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image {path} has zero width or height")]
    EmptyImage { path: PathBuf },

    #[error("model unavailable at {path}: {reason}")]
    ModelUnavailable { path: PathBuf, reason: String },

    #[error("inference failed: {message}")]
    Inference { message: String },

    #[error("resize failed: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("empty image reference")]
    EmptyReference,

    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("download cache error at {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DetectionError {
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    /// Whether the failure was caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyReference
                | Self::ImageLoad { .. }
                | Self::EmptyImage { .. }
                | Self::Download { .. }
        )
    }
}

impl From<ort::Error> for DetectionError {
    fn from(e: ort::Error) -> Self {
        Self::inference(e.to_string())
    }
}

pub type Result<T, E = DetectionError> = std::result::Result<T, E>;
