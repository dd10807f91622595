use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::postprocess::DetectionSet;

const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Outline every detection on `img`. Boxes are already in its pixel space.
pub fn draw_detections(img: &mut RgbaImage, detections: &DetectionSet) {
    for det in detections.iter() {
        let [x1, y1, x2, y2] = det.bbox;
        let (left, top) = (x1.round() as i32, y1.round() as i32);
        let width = (x2 - x1).round() as i64;
        let height = (y2 - y1).round() as i64;
        if width <= 0 || height <= 0 {
            continue;
        }
        let rect = Rect::at(left, top).of_size(width as u32, height as u32);
        // 2px outline
        draw_hollow_rect_mut(img, rect, BOX_COLOR);
        if width > 2 && height > 2 {
            let inner = Rect::at(left + 1, top + 1).of_size(width as u32 - 2, height as u32 - 2);
            draw_hollow_rect_mut(img, inner, BOX_COLOR);
        }
    }
}

/// Load the original image, outline the detections and save it to `output_path`.
pub fn save_annotated(img_path: &Path, detections: Option<&DetectionSet>, output_path: &Path) -> Result<()> {
    let mut img = image::open(img_path)
        .with_context(|| format!("failed to open {}", img_path.display()))?
        .to_rgba8();
    if let Some(detections) = detections {
        draw_detections(&mut img, detections);
    }
    img.save(output_path)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    Ok(())
}
