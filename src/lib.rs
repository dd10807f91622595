pub mod adapter;
pub mod annotate;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod report;
pub mod resolve;
pub mod service;
pub mod tensor;

pub use crate::cli::Args;
pub use crate::config::ServiceConfig;
pub use crate::error::DetectionError;
pub use crate::model::{InferenceModel, InputSpec, ModelSlot, OnnxModel, OrtModel};
pub use crate::pipeline::{DetectionSettings, Detections, EggCounter, run_detection};
pub use crate::postprocess::{Detection, DetectionSet, postprocess};
pub use crate::preprocess::{PreprocessConfig, Preprocessed, Processor, ScaleFactors};
pub use crate::report::{EGG_LABELS, EggDetection, EggReport, assemble};
pub use crate::resolve::{Resolved, TensorRole, resolve};
pub use crate::service::{AppState, router};
pub use crate::tensor::{ElementType, RawTensor};
