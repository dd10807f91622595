use ndarray::{ArrayD, Axis};

/// Declared element type of a model input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Float16,
    BFloat16,
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Bool,
    String,
    Other,
}

impl ElementType {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Uint8
                | Self::Uint16
                | Self::Uint32
                | Self::Uint64
        )
    }
}

/// A dense n-d tensor exchanged with the model.
///
/// Float tensors of any width are carried as `f32`, integer tensors of any
/// width as `i64`; the element kind is what the resolver keys on.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTensor {
    Float(ArrayD<f32>),
    Int(ArrayD<i64>),
}

impl RawTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(a) => a.shape(),
            Self::Int(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// Drops a leading batch axis of size 1 from tensors of rank 2 or more.
    pub fn squeeze_batch(self) -> Self {
        if self.ndim() < 2 || self.shape()[0] != 1 {
            return self;
        }
        match self {
            Self::Float(a) => Self::Float(a.index_axis_move(Axis(0), 0)),
            Self::Int(a) => Self::Int(a.index_axis_move(Axis(0), 0)),
        }
    }

    /// Values as `f32`, casting integers.
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            Self::Float(a) => a.clone(),
            Self::Int(a) => a.mapv(|v| v as f32),
        }
    }

    /// Values as `i64`; floats are truncated toward zero.
    pub fn to_i64(&self) -> ArrayD<i64> {
        match self {
            Self::Float(a) => a.mapv(|v| v as i64),
            Self::Int(a) => a.clone(),
        }
    }
}

impl From<ArrayD<f32>> for RawTensor {
    fn from(a: ArrayD<f32>) -> Self {
        Self::Float(a)
    }
}

impl From<ArrayD<i64>> for RawTensor {
    fn from(a: ArrayD<i64>) -> Self {
        Self::Int(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn squeeze_removes_only_unit_batch() {
        let batched = RawTensor::Float(ArrayD::zeros(IxDyn(&[1, 3, 6])));
        assert_eq!(batched.squeeze_batch().shape(), &[3, 6]);

        let unbatched = RawTensor::Float(ArrayD::zeros(IxDyn(&[2, 4])));
        assert_eq!(unbatched.squeeze_batch().shape(), &[2, 4]);

        let vector = RawTensor::Int(ArrayD::zeros(IxDyn(&[1])));
        assert_eq!(vector.squeeze_batch().shape(), &[1]);
    }

    #[test]
    fn float_to_int_truncates() {
        let t = RawTensor::Float(ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.9, 1.7, -1.5]).unwrap());
        assert_eq!(t.to_i64().iter().copied().collect::<Vec<_>>(), vec![0, 1, -1]);
    }
}
