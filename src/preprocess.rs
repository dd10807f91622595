use std::path::Path;

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, ImageReader};
use ndarray::Array4;
use rayon::prelude::*;

use crate::error::{DetectionError, Result};

/// Side length of the square model input.
pub const DEFAULT_INPUT_SIDE: u32 = 640;

const CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessConfig {
    pub side: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            side: DEFAULT_INPUT_SIDE,
        }
    }
}

/// Ratio of original dimension to model input side, per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub sx: f32,
    pub sy: f32,
}

impl ScaleFactors {
    pub fn new(orig_width: u32, orig_height: u32, side: u32) -> Self {
        Self {
            sx: orig_width as f32 / side as f32,
            sy: orig_height as f32 / side as f32,
        }
    }
}

/// A model-ready tensor together with what is needed to undo the resize.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// NCHW, shape `(1, 3, side, side)`, values in `[0, 1]`.
    pub tensor: Array4<f32>,
    pub scale: ScaleFactors,
    pub orig_width: u32,
    pub orig_height: u32,
}

#[derive(Debug, Default)]
pub struct Processor {
    pub config: PreprocessConfig,
}

impl Processor {
    /// Create a new instance of the Processor struct
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn side(&self) -> u32 {
        self.config.side
    }

    /// Load the image at `path` and turn it into a model input tensor.
    pub fn preprocess_path(&self, path: &Path) -> Result<Preprocessed> {
        let image = load_image(path).map_err(|source| DetectionError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectionError::EmptyImage {
                path: path.to_path_buf(),
            });
        }
        self.preprocess(&image)
    }

    /// Stretch to `side x side` with bilinear filtering (no letterboxing),
    /// scale to `[0, 1]` and lay out as NCHW.
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Preprocessed> {
        let side = self.config.side;
        let (orig_width, orig_height) = (image.width(), image.height());

        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut resized = Image::new(side, side, PixelType::U8x3);
        let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        Resizer::new().resize(&rgb, &mut resized, Some(&options))?;

        let tensor = to_nchw(resized.buffer(), side as usize)?;
        Ok(Preprocessed {
            tensor,
            scale: ScaleFactors::new(orig_width, orig_height, side),
            orig_width,
            orig_height,
        })
    }
}

// format comes from the file contents, the extension is only a hint
fn load_image(path: &Path) -> image::ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Interleaved RGB bytes to a normalized `(1, 3, side, side)` tensor, one plane per channel.
fn to_nchw(pixels: &[u8], side: usize) -> Result<Array4<f32>> {
    let plane = side * side;
    let mut data = vec![0f32; CHANNELS * plane];
    data.par_chunks_mut(plane)
        .enumerate()
        .for_each(|(channel, out)| {
            for (dst, px) in out.iter_mut().zip(pixels.chunks_exact(CHANNELS)) {
                *dst = px[channel] as f32 / 255.0;
            }
        });
    Ok(Array4::from_shape_vec((1, CHANNELS, side, side), data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn checker(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([255, 128, 0])
            } else {
                Rgb([0, 64, 255])
            }
        }))
    }

    #[test]
    fn tensor_shape_and_range() {
        let processor = Processor::new(PreprocessConfig { side: 64 });
        let out = processor.preprocess(&checker(200, 90)).unwrap();

        assert_eq!(out.tensor.shape(), &[1, 3, 64, 64]);
        assert!(out.tensor.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!((out.orig_width, out.orig_height), (200, 90));
    }

    #[test]
    fn scale_factors_invert_resize() {
        let processor = Processor::new(PreprocessConfig { side: 640 });
        let out = processor.preprocess(&checker(1280, 640)).unwrap();

        assert_eq!(out.scale, ScaleFactors { sx: 2.0, sy: 1.0 });
        assert!((out.scale.sx * 640.0 - 1280.0).abs() < 1e-3);
        assert!((out.scale.sy * 640.0 - 640.0).abs() < 1e-3);
    }

    #[test]
    fn channels_are_planar() {
        let solid = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 51])));
        let out = Processor::new(PreprocessConfig { side: 4 })
            .preprocess(&solid)
            .unwrap();

        assert!(out.tensor.index_axis(ndarray::Axis(1), 0).iter().all(|&v| (v - 1.0).abs() < 1e-2));
        assert!(out.tensor.index_axis(ndarray::Axis(1), 1).iter().all(|&v| v.abs() < 1e-2));
        assert!(out.tensor.index_axis(ndarray::Axis(1), 2).iter().all(|&v| (v - 0.2).abs() < 1e-2));
    }

    #[test]
    fn grayscale_is_expanded_to_three_channels() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(5, 7, image::Luma([255])));
        let out = Processor::new(PreprocessConfig { side: 8 }).preprocess(&gray).unwrap();
        assert_eq!(out.tensor.shape(), &[1, 3, 8, 8]);
    }

    #[test]
    fn format_is_detected_from_contents() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("tray.png");
        checker(32, 16).save(&png).unwrap();
        let bare = dir.path().join("tray");
        let misnamed = dir.path().join("tray.jpg");
        std::fs::copy(&png, &bare).unwrap();
        std::fs::copy(&png, &misnamed).unwrap();

        let processor = Processor::new(PreprocessConfig { side: 16 });
        let expected = processor.preprocess_path(&png).unwrap();
        for path in [&bare, &misnamed] {
            let out = processor.preprocess_path(path).unwrap();
            assert_eq!(out.tensor, expected.tensor);
            assert_eq!((out.orig_width, out.orig_height), (32, 16));
        }
    }

    #[test]
    fn undecodable_bytes_are_image_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes");
        std::fs::write(&path, b"not an image at all").unwrap();
        let err = Processor::default().preprocess_path(&path).unwrap_err();
        assert!(matches!(err, DetectionError::ImageLoad { .. }));
    }

    #[test]
    fn missing_file_is_image_load_error() {
        let err = Processor::default()
            .preprocess_path(Path::new("/definitely/not/here.png"))
            .unwrap_err();
        assert!(matches!(err, DetectionError::ImageLoad { .. }));
    }
}
