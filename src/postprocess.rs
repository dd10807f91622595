use ndarray::{Array1, Array2, Axis};

use crate::preprocess::ScaleFactors;
use crate::resolve::Resolved;

/// One detection in original-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    pub score: f32,
    pub class_id: i64,
}

/// Aligned boxes, scores and classes; every row is one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSet {
    boxes: Array2<f32>,
    scores: Array1<f32>,
    classes: Array1<i64>,
}

impl DetectionSet {
    /// Returns `None` unless boxes has four columns and scores one entry per box.
    /// Missing or misaligned classes default to 0.
    pub fn new(boxes: Array2<f32>, scores: Array1<f32>, classes: Option<Array1<i64>>) -> Option<Self> {
        let n = boxes.nrows();
        if boxes.ncols() != 4 || scores.len() != n {
            return None;
        }
        let classes = classes
            .filter(|c| c.len() == n)
            .unwrap_or_else(|| Array1::zeros(n));
        Some(Self {
            boxes,
            scores,
            classes,
        })
    }

    pub fn len(&self) -> usize {
        self.boxes.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn boxes(&self) -> &Array2<f32> {
        &self.boxes
    }

    pub fn scores(&self) -> &Array1<f32> {
        &self.scores
    }

    pub fn classes(&self) -> &Array1<i64> {
        &self.classes
    }

    pub fn iter(&self) -> impl Iterator<Item = Detection> + '_ {
        self.boxes
            .outer_iter()
            .zip(self.scores.iter().zip(self.classes.iter()))
            .map(|(b, (&score, &class_id))| Detection {
                bbox: [b[0], b[1], b[2], b[3]],
                score,
                class_id,
            })
    }
}

/// Maps boxes from model-input space back onto the original image.
pub fn rescale_boxes(boxes: &mut Array2<f32>, scale: ScaleFactors) {
    for mut row in boxes.rows_mut() {
        row[0] *= scale.sx;
        row[1] *= scale.sy;
        row[2] *= scale.sx;
        row[3] *= scale.sy;
    }
}

/// Rescale, then keep rows with `score >= threshold`.
///
/// Rows without a score count as fully confident. Classes are kept only when
/// they line up with the boxes. `None` when nothing survives.
pub fn postprocess(resolved: Option<Resolved>, scale: ScaleFactors, threshold: f32) -> Option<DetectionSet> {
    let Resolved {
        mut boxes,
        scores,
        classes,
    } = resolved?;
    rescale_boxes(&mut boxes, scale);

    let n = boxes.nrows();
    let scores = scores.unwrap_or_else(|| Array1::ones(n));
    let keep: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s >= threshold)
        .map(|(i, _)| i)
        .collect();
    if keep.is_empty() {
        return None;
    }

    let classes = classes
        .filter(|c| c.len() == n)
        .map(|c| c.select(Axis(0), &keep));
    DetectionSet::new(
        boxes.select(Axis(0), &keep),
        scores.select(Axis(0), &keep),
        classes,
    )
}
