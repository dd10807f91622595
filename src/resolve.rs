//! Recovers boxes, scores and classes from model outputs whose order and
//! layout depend on how the model was exported.
//!
//! Only shapes and element kinds are trusted. Each output is first classified
//! into a [`TensorRole`]; the rules below then pick, in list order, the first
//! tensor that can fill each field:
//!
//! 1. `(N, 5)` / `(N, 6)` rows of `[x1, y1, x2, y2, score, (class)]`. Boxes and
//!    scores come from the first such tensor, classes from the first 6-wide one.
//! 2. Otherwise boxes from the first `(N, 4)` tensor.
//! 3. Missing scores from the first float vector of length `N`.
//! 4. Missing classes from the first integer vector of length `N`.
//!
//! No boxes means no detections.

use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2, s};
use tracing::warn;

use crate::tensor::RawTensor;

/// What a single output tensor can contribute, judged by shape and element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    /// `(N, 5)` or `(N, 6)` rows with boxes, score and optionally class.
    Detections { rows: usize, with_class: bool },
    /// `(N, 4)` corner boxes.
    Boxes { rows: usize },
    /// Float vector; scores when its length matches the box count.
    Scores { len: usize },
    /// Integer vector; class ids when its length matches the box count.
    Classes { len: usize },
    Unknown,
}

/// Classify an output after batch squeezing.
pub fn classify(tensor: &RawTensor) -> TensorRole {
    match *tensor.shape() {
        [rows, 5] => TensorRole::Detections {
            rows,
            with_class: false,
        },
        [rows, 6] => TensorRole::Detections {
            rows,
            with_class: true,
        },
        [rows, 4] => TensorRole::Boxes { rows },
        [len] if tensor.is_float() => TensorRole::Scores { len },
        [len] if tensor.is_integer() => TensorRole::Classes { len },
        _ => TensorRole::Unknown,
    }
}

/// Boxes in model-input space plus whatever scores and classes were found.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub boxes: Array2<f32>,
    pub scores: Option<Array1<f32>>,
    pub classes: Option<Array1<i64>>,
}

impl Resolved {
    pub fn len(&self) -> usize {
        self.boxes.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matrix(data: ArrayD<f32>) -> Array2<f32> {
    // classify() has already checked the rank
    data.into_dimensionality::<Ix2>()
        .unwrap_or_else(|_| Array2::zeros((0, 4)))
}

fn vector<T>(data: ArrayD<T>) -> Array1<T> {
    data.into_dimensionality::<Ix1>()
        .unwrap_or_else(|_| Array1::from_vec(Vec::new()))
}

/// Infer the canonical detection triple from raw outputs.
///
/// Deterministic for a given ordered list; returns `None` when no tensor
/// provides boxes.
pub fn resolve(outputs: Vec<RawTensor>) -> Option<Resolved> {
    let tensors: Vec<RawTensor> = outputs.into_iter().map(RawTensor::squeeze_batch).collect();
    let roles: Vec<TensorRole> = tensors.iter().map(classify).collect();

    let mut boxes: Option<Array2<f32>> = None;
    let mut scores: Option<Array1<f32>> = None;
    let mut classes: Option<Array1<i64>> = None;

    for (tensor, role) in tensors.iter().zip(&roles) {
        let TensorRole::Detections { with_class, .. } = *role else {
            continue;
        };
        let rows = matrix(tensor.to_f32());
        if boxes.is_none() {
            boxes = Some(rows.slice(s![.., ..4]).to_owned());
        }
        if scores.is_none() {
            scores = Some(rows.column(4).to_owned());
        }
        if with_class && classes.is_none() {
            classes = Some(rows.column(5).mapv(|c| c as i64));
        }
    }

    if boxes.is_none() {
        boxes = tensors
            .iter()
            .zip(&roles)
            .find(|(_, role)| matches!(role, TensorRole::Boxes { .. }))
            .map(|(tensor, _)| matrix(tensor.to_f32()));
    }
    let boxes = boxes?;
    let n = boxes.nrows();
    warn_on_ambiguity(&roles, n);

    if scores.is_none() {
        scores = tensors
            .iter()
            .zip(&roles)
            .find(|(_, role)| **role == TensorRole::Scores { len: n })
            .map(|(tensor, _)| vector(tensor.to_f32()));
    }
    if classes.is_none() {
        classes = tensors
            .iter()
            .zip(&roles)
            .find(|(_, role)| **role == TensorRole::Classes { len: n })
            .map(|(tensor, _)| vector(tensor.to_i64()));
    }

    Some(Resolved {
        boxes,
        scores,
        classes,
    })
}

/// Fields for which more than one output qualified, given `n` boxes.
pub fn ambiguous_fields(roles: &[TensorRole], n: usize) -> Vec<&'static str> {
    let count = |pred: fn(&TensorRole, usize) -> bool| roles.iter().filter(|r| pred(r, n)).count();
    let rows = count(|r, _| matches!(r, TensorRole::Detections { .. }));
    let rows_with_class = count(|r, _| matches!(r, TensorRole::Detections { with_class: true, .. }));

    let boxes = if rows > 0 {
        rows
    } else {
        count(|r, _| matches!(r, TensorRole::Boxes { .. }))
    };
    let scores = if rows > 0 {
        rows
    } else {
        count(|r, n| *r == TensorRole::Scores { len: n })
    };
    let classes = if rows_with_class > 0 {
        rows_with_class
    } else {
        count(|r, n| *r == TensorRole::Classes { len: n })
    };

    [("boxes", boxes), ("scores", scores), ("classes", classes)]
        .into_iter()
        .filter(|&(_, candidates)| candidates > 1)
        .map(|(field, _)| field)
        .collect()
}

// first-match-wins still decides; this only makes the choice visible
fn warn_on_ambiguity(roles: &[TensorRole], n: usize) {
    for field in ambiguous_fields(roles, n) {
        warn!(field, ?roles, "several outputs qualify; using the first in model order");
    }
}
