use ndarray::{Array4, ArrayD, IxDyn, arr1, arr2};
use tracing::debug;

use crate::error::Result;
use crate::model::{InferenceModel, InputSpec};
use crate::tensor::{ElementType, RawTensor};

/// Value fed to a declared input other than the image.
fn auxiliary_input(spec: &InputSpec, side: u32) -> RawTensor {
    let side = i64::from(side);
    match spec.shape.as_slice() {
        // e.g. `orig_target_sizes: [N, 2]`; the model sees the resized image
        [_, Some(2)] => RawTensor::Int(arr2(&[[side, side]]).into_dyn()),
        [Some(2)] | [None] => RawTensor::Int(arr1(&[side, side]).into_dyn()),
        _ => scalar_one(spec.element),
    }
}

// float inputs get 1.0, everything else an integer 1
fn scalar_one(element: ElementType) -> RawTensor {
    if element.is_float() {
        RawTensor::Float(ArrayD::from_elem(IxDyn(&[]), 1.0))
    } else {
        RawTensor::Int(ArrayD::from_elem(IxDyn(&[]), 1))
    }
}

/// Named inputs for one inference call.
///
/// The first declared input receives the image tensor; every other declared
/// input gets a best-effort value. A value the model rejects surfaces as an
/// inference error from `run`.
pub fn build_inputs(specs: &[InputSpec], image: Array4<f32>, side: u32) -> Vec<(String, RawTensor)> {
    let mut inputs = Vec::with_capacity(specs.len());
    let Some((first, rest)) = specs.split_first() else {
        return inputs;
    };
    inputs.push((first.name.clone(), RawTensor::Float(image.into_dyn())));

    for spec in rest {
        let value = auxiliary_input(spec, side);
        debug!(input = %spec.name, element = ?spec.element, shape = ?value.shape(), "auxiliary input");
        inputs.push((spec.name.clone(), value));
    }
    inputs
}

/// Runs the model once and returns its outputs untouched, in model order.
pub fn run<M: InferenceModel + ?Sized>(model: &M, image: Array4<f32>, side: u32) -> Result<Vec<RawTensor>> {
    let inputs = build_inputs(model.inputs(), image, side);
    model.run(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, shape: &[Option<usize>], element: ElementType) -> InputSpec {
        InputSpec::new(name, shape.to_vec(), element)
    }

    fn image() -> Array4<f32> {
        Array4::zeros((1, 3, 4, 4))
    }

    #[test]
    fn first_input_gets_image() {
        let specs = [spec("images", &[Some(1), Some(3), Some(4), Some(4)], ElementType::Float32)];
        let inputs = build_inputs(&specs, image(), 4);

        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].0, "images");
        assert_eq!(inputs[0].1.shape(), &[1, 3, 4, 4]);
        assert!(inputs[0].1.is_float());
    }

    #[test]
    fn size_pair_inputs() {
        let specs = [
            spec("images", &[None, Some(3), None, None], ElementType::Float32),
            spec("orig_target_sizes", &[None, Some(2)], ElementType::Int64),
            spec("im_shape", &[Some(2)], ElementType::Int64),
            spec("dyn_shape", &[None], ElementType::Int64),
        ];
        let inputs = build_inputs(&specs, image(), 640);

        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[1].1, RawTensor::Int(arr2(&[[640, 640]]).into_dyn()));
        assert_eq!(inputs[2].1, RawTensor::Int(arr1(&[640, 640]).into_dyn()));
        assert_eq!(inputs[3].1, RawTensor::Int(arr1(&[640, 640]).into_dyn()));
    }

    #[test]
    fn unknown_inputs_get_typed_scalar() {
        let specs = [
            spec("images", &[Some(1), Some(3), Some(4), Some(4)], ElementType::Float32),
            spec("scale", &[Some(1), Some(3)], ElementType::Float16),
            spec("step", &[], ElementType::Int32),
            spec("prompt", &[Some(1)], ElementType::String),
        ];
        let inputs = build_inputs(&specs, image(), 4);

        let names: Vec<_> = inputs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["images", "scale", "step", "prompt"]);
        assert_eq!(inputs[1].1, RawTensor::Float(ArrayD::from_elem(IxDyn(&[]), 1.0)));
        assert_eq!(inputs[2].1, RawTensor::Int(ArrayD::from_elem(IxDyn(&[]), 1)));
        assert_eq!(inputs[3].1, RawTensor::Int(ArrayD::from_elem(IxDyn(&[]), 1)));
    }

    #[test]
    fn no_declared_inputs_feeds_nothing() {
        assert!(build_inputs(&[], image(), 4).is_empty());
    }
}
