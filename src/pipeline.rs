use std::path::Path;
use std::time::Instant;

use tracing::{debug, instrument};

use crate::adapter;
use crate::error::Result;
use crate::model::{InferenceModel, ModelSlot};
use crate::postprocess::{DetectionSet, postprocess};
use crate::preprocess::{PreprocessConfig, Processor};
use crate::report::{EGG_LABELS, EggReport, assemble, label_for};
use crate::resolve::resolve;

/// Threshold and input size for one detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    pub threshold: f32,
    pub input_side: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            input_side: crate::preprocess::DEFAULT_INPUT_SIDE,
        }
    }
}

/// Result of one detection run: the surviving detections, if any, and the
/// class names they refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Detections {
    pub set: Option<DetectionSet>,
    pub labels: &'static [&'static str],
}

impl Detections {
    pub fn report(&self) -> EggReport {
        assemble(self.set.as_ref())
    }

    /// Class name for a detection's class id.
    pub fn label(&self, class_id: i64) -> String {
        label_for(self.labels, class_id)
    }
}

/// Preprocess, infer, resolve and postprocess one image with the given model.
pub fn run_detection<M: InferenceModel + ?Sized>(
    image_path: &Path,
    settings: &DetectionSettings,
    model: &M,
) -> Result<Detections> {
    let processor = Processor::new(PreprocessConfig {
        side: settings.input_side,
    });
    let input = processor.preprocess_path(image_path)?;
    let outputs = adapter::run(model, input.tensor, settings.input_side)?;
    debug!(
        shapes = ?outputs.iter().map(|t| t.shape().to_vec()).collect::<Vec<_>>(),
        "model outputs"
    );
    let set = postprocess(resolve(outputs), input.scale, settings.threshold);
    Ok(Detections {
        set,
        labels: EGG_LABELS,
    })
}

/// Counts eggs with a shared model handle.
pub struct EggCounter<M> {
    model: ModelSlot<M>,
    settings: DetectionSettings,
}

impl<M: InferenceModel> EggCounter<M> {
    pub fn new(model: ModelSlot<M>, settings: DetectionSettings) -> Self {
        Self { model, settings }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub fn model(&self) -> &ModelSlot<M> {
        &self.model
    }

    pub fn detect(&self, image_path: &Path) -> Result<Detections> {
        let model = self.model.get()?;
        run_detection(image_path, &self.settings, model.as_ref())
    }

    #[instrument(skip(self, image_path), fields(image = %image_path.display()))]
    pub fn count(&self, image_path: &Path) -> Result<EggReport> {
        let start = Instant::now();
        let report = self.detect(image_path)?.report();
        debug!(
            egg_count = report.egg_count,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "counted eggs"
        );
        Ok(report)
    }
}
