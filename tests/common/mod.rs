#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use eggcount::error::Result;
use eggcount::{DetectionError, ElementType, InferenceModel, InputSpec, RawTensor};
use image::{Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};

/// Stands in for an ONNX session: fixed signature, canned outputs, and a
/// record of every input mapping it was called with.
pub struct FakeModel {
    inputs: Vec<InputSpec>,
    outputs: Vec<RawTensor>,
    fail_with: Option<String>,
    pub calls: Mutex<Vec<Vec<(String, RawTensor)>>>,
}

impl FakeModel {
    pub fn new(outputs: Vec<RawTensor>) -> Self {
        Self {
            inputs: vec![InputSpec::new(
                "images",
                vec![Some(1), Some(3), Some(640), Some(640)],
                ElementType::Float32,
            )],
            outputs,
            fail_with: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_input(mut self, spec: InputSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn last_call(&self) -> Vec<(String, RawTensor)> {
        self.calls.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl InferenceModel for FakeModel {
    fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    fn run(&self, inputs: Vec<(String, RawTensor)>) -> Result<Vec<RawTensor>> {
        self.calls.lock().unwrap().push(inputs);
        match &self.fail_with {
            Some(message) => Err(DetectionError::inference(message.clone())),
            None => Ok(self.outputs.clone()),
        }
    }
}

pub fn float(shape: &[usize], data: Vec<f32>) -> RawTensor {
    RawTensor::Float(ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
}

pub fn int(shape: &[usize], data: Vec<i64>) -> RawTensor {
    RawTensor::Int(ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
}

/// Write a `width x height` PNG into `dir` and return its path.
pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 200]))
        .save(&path)
        .unwrap();
    path
}
