use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{DynValue, Tensor, ValueType};
use tracing::{debug, info, warn};

use crate::error::{DetectionError, Result};
use crate::tensor::{ElementType, RawTensor};

/// Declared name, shape and element type of one model input.
///
/// Dynamic or symbolic dimensions are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub shape: Vec<Option<usize>>,
    pub element: ElementType,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, shape: Vec<Option<usize>>, element: ElementType) -> Self {
        Self {
            name: name.into(),
            shape,
            element,
        }
    }
}

/// The detection model as the pipeline sees it: a declared input signature
/// and a single call that maps named inputs to every output, in model order.
pub trait InferenceModel: Send + Sync {
    fn inputs(&self) -> &[InputSpec];

    fn run(&self, inputs: Vec<(String, RawTensor)>) -> Result<Vec<RawTensor>>;
}

impl<M: InferenceModel + ?Sized> InferenceModel for Arc<M> {
    fn inputs(&self) -> &[InputSpec] {
        (**self).inputs()
    }

    fn run(&self, inputs: Vec<(String, RawTensor)>) -> Result<Vec<RawTensor>> {
        (**self).run(inputs)
    }
}

/// Builds ONNX Runtime sessions.
pub struct OnnxModel {
    providers: Vec<ExecutionProviderDispatch>,
}

impl Default for OnnxModel {
    /// CUDA when the runtime offers it, CPU otherwise.
    fn default() -> Self {
        Self {
            providers: vec![
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
        }
    }
}

impl OnnxModel {
    pub fn load_model(&self, model_path: &Path) -> Result<OrtModel> {
        let session = SessionBuilder::new()?
            .with_execution_providers(self.providers.clone())?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)?;
        let model = OrtModel::from_session(session);
        info!(
            path = %model_path.display(),
            inputs = ?model.inputs,
            outputs = model.outputs.len(),
            "detection model loaded"
        );
        Ok(model)
    }
}

/// An ONNX Runtime session behind [`InferenceModel`].
pub struct OrtModel {
    session: Session,
    inputs: Vec<InputSpec>,
    outputs: Vec<(String, ElementType)>,
}

impl std::fmt::Debug for OrtModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtModel")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl OrtModel {
    pub fn from_session(session: Session) -> Self {
        let inputs = session
            .inputs
            .iter()
            .map(|input| InputSpec {
                name: input.name.clone(),
                shape: declared_shape(&input.input_type),
                element: declared_element(&input.input_type),
            })
            .collect();
        let outputs = session
            .outputs
            .iter()
            .map(|output| (output.name.clone(), declared_element(&output.output_type)))
            .collect();
        Self {
            session,
            inputs,
            outputs,
        }
    }
}

impl InferenceModel for OrtModel {
    fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    fn run(&self, inputs: Vec<(String, RawTensor)>) -> Result<Vec<RawTensor>> {
        let mut feed: Vec<(String, DynValue)> = Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            let element = self
                .inputs
                .iter()
                .find(|spec| spec.name == name)
                .map(|spec| spec.element)
                .unwrap_or(ElementType::Other);
            feed.push((name, to_session_value(tensor, element)?));
        }

        let ys = self.session.run(feed)?;
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for (name, element) in &self.outputs {
            match from_value(&ys[name.as_str()], *element)? {
                Some(tensor) => outputs.push(tensor),
                None => debug!(output = %name, ?element, "skipping non-numeric output"),
            }
        }
        Ok(outputs)
    }
}

fn declared_shape(ty: &ValueType) -> Vec<Option<usize>> {
    ty.tensor_dimensions()
        .map(|dims| {
            dims.iter()
                .map(|&d| usize::try_from(d).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn declared_element(ty: &ValueType) -> ElementType {
    match ty.tensor_type() {
        Some(TensorElementType::Float16) => ElementType::Float16,
        Some(TensorElementType::Bfloat16) => ElementType::BFloat16,
        Some(TensorElementType::Float32) => ElementType::Float32,
        Some(TensorElementType::Float64) => ElementType::Float64,
        Some(TensorElementType::Int8) => ElementType::Int8,
        Some(TensorElementType::Int16) => ElementType::Int16,
        Some(TensorElementType::Int32) => ElementType::Int32,
        Some(TensorElementType::Int64) => ElementType::Int64,
        Some(TensorElementType::Uint8) => ElementType::Uint8,
        Some(TensorElementType::Uint16) => ElementType::Uint16,
        Some(TensorElementType::Uint32) => ElementType::Uint32,
        Some(TensorElementType::Uint64) => ElementType::Uint64,
        Some(TensorElementType::Bool) => ElementType::Bool,
        Some(TensorElementType::String) => ElementType::String,
        _ => ElementType::Other,
    }
}

/// Casts to the width the model declared for this input.
fn to_session_value(tensor: RawTensor, element: ElementType) -> ort::Result<DynValue> {
    Ok(match (tensor, element) {
        (RawTensor::Float(a), ElementType::Float64) => Tensor::from_array(a.mapv(f64::from))?.into_dyn(),
        (RawTensor::Float(a), ElementType::Float16) => {
            Tensor::from_array(a.mapv(half::f16::from_f32))?.into_dyn()
        }
        (RawTensor::Float(a), _) => Tensor::from_array(a)?.into_dyn(),
        (RawTensor::Int(a), ElementType::Int32) => Tensor::from_array(a.mapv(|v| v as i32))?.into_dyn(),
        (RawTensor::Int(a), ElementType::Float32) => Tensor::from_array(a.mapv(|v| v as f32))?.into_dyn(),
        (RawTensor::Int(a), _) => Tensor::from_array(a)?.into_dyn(),
    })
}

fn from_value(value: &DynValue, element: ElementType) -> ort::Result<Option<RawTensor>> {
    let tensor = match element {
        ElementType::Float32 => RawTensor::Float(value.try_extract_tensor::<f32>()?.into_owned()),
        ElementType::Float64 => RawTensor::Float(value.try_extract_tensor::<f64>()?.mapv(|v| v as f32)),
        ElementType::Float16 => RawTensor::Float(value.try_extract_tensor::<half::f16>()?.mapv(f32::from)),
        ElementType::BFloat16 => RawTensor::Float(value.try_extract_tensor::<half::bf16>()?.mapv(f32::from)),
        ElementType::Int64 => RawTensor::Int(value.try_extract_tensor::<i64>()?.into_owned()),
        ElementType::Int32 => RawTensor::Int(value.try_extract_tensor::<i32>()?.mapv(i64::from)),
        ElementType::Int16 => RawTensor::Int(value.try_extract_tensor::<i16>()?.mapv(i64::from)),
        ElementType::Int8 => RawTensor::Int(value.try_extract_tensor::<i8>()?.mapv(i64::from)),
        ElementType::Uint8 => RawTensor::Int(value.try_extract_tensor::<u8>()?.mapv(i64::from)),
        ElementType::Uint16 => RawTensor::Int(value.try_extract_tensor::<u16>()?.mapv(i64::from)),
        ElementType::Uint32 => RawTensor::Int(value.try_extract_tensor::<u32>()?.mapv(i64::from)),
        ElementType::Uint64 => RawTensor::Int(value.try_extract_tensor::<u64>()?.mapv(|v| v as i64)),
        ElementType::Bool | ElementType::String | ElementType::Other => return Ok(None),
    };
    Ok(Some(tensor))
}

type Loader<M> = Box<dyn Fn(&Path) -> Result<M> + Send + Sync>;

/// Process-wide model handle, built at most once.
///
/// A slot is either ready from the start or created lazily on first use.
/// Failed loads are not cached, so a later call tries again.
pub struct ModelSlot<M> {
    path: PathBuf,
    loader: Option<Loader<M>>,
    model: RwLock<Option<Arc<M>>>,
}

impl<M> ModelSlot<M> {
    pub fn ready(model: M) -> Self {
        Self {
            path: PathBuf::new(),
            loader: None,
            model: RwLock::new(Some(Arc::new(model))),
        }
    }

    pub fn lazy<F>(path: impl Into<PathBuf>, loader: F) -> Self
    where
        F: Fn(&Path) -> Result<M> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            loader: Some(Box::new(loader)),
            model: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn get(&self) -> Result<Arc<M>> {
        if let Some(model) = self.model.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(model));
        }

        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        // another request may have finished loading while we waited
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        let unavailable = |reason: String| DetectionError::ModelUnavailable {
            path: self.path.clone(),
            reason,
        };
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| unavailable("no loader configured".into()))?;
        if !self.path.exists() {
            return Err(unavailable("model file not found".into()));
        }

        let model = Arc::new(loader(&self.path).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "model initialization failed");
            match e {
                DetectionError::ModelUnavailable { .. } => e,
                other => unavailable(other.to_string()),
            }
        })?);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }
}

impl ModelSlot<OrtModel> {
    /// Lazily loads an ONNX model with every available execution provider.
    pub fn onnx(path: impl Into<PathBuf>) -> Self {
        Self::lazy(path, |path| OnnxModel::default().load_model(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Dummy;

    #[test]
    fn missing_model_file_is_unavailable_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slot = ModelSlot::lazy(&path, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Dummy)
        });

        assert!(matches!(slot.get(), Err(DetectionError::ModelUnavailable { .. })));
        assert!(!slot.is_loaded());

        std::fs::write(&path, b"weights").unwrap();
        assert!(slot.get().is_ok());
        assert!(slot.get().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"weights").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slot = ModelSlot::lazy(&path, move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DetectionError::inference("corrupt graph"))
            } else {
                Ok(Dummy)
            }
        });

        let err = slot.get().err().unwrap();
        assert!(matches!(err, DetectionError::ModelUnavailable { ref reason, .. } if reason.contains("corrupt graph")));
        assert!(slot.get().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"weights").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slot = Arc::new(ModelSlot::lazy(&path, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Dummy)
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                std::thread::spawn(move || slot.get().is_ok())
            })
            .collect();
        assert!(handles.into_iter().all(|h| h.join().unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ready_slot_needs_no_file() {
        let slot = ModelSlot::ready(Dummy);
        assert!(slot.is_loaded());
        assert!(slot.get().is_ok());
    }
}
