//! Preprocessing for detector inference.
//!
//! Frames are stretched to the model input size (no letterboxing), converted to planar RGB,
//! and scaled to `[0, 1]`. Because the stretch is per-axis, a detection's position relative to
//! the model input is also its position relative to the original frame.

use std::{borrow::Cow, path::Path};

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use mdframes_utils::{config::DetectorSettings, load_image, rgb_to_chw, timing_guard};
use tract_onnx::prelude::Tensor;

/// Model input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub input_size: InputSize,
    pub filter: FilterType,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: InputSize::default(),
            filter: FilterType::Triangle,
        }
    }
}

impl From<&DetectorSettings> for PreprocessConfig {
    fn from(settings: &DetectorSettings) -> Self {
        PreprocessConfig {
            input_size: InputSize::new(settings.input_width, settings.input_height),
            ..Default::default()
        }
    }
}

/// Load an image file and preprocess it into a `[1, 3, H, W]` RGB tensor in `[0, 1]`.
pub fn preprocess_image<P: AsRef<Path>>(path: P, config: &PreprocessConfig) -> Result<Tensor> {
    let _guard = timing_guard("mdframes_core::preprocess_image", log::Level::Debug);
    let path_ref = path.as_ref();
    anyhow::ensure!(
        path_ref.exists(),
        "input image does not exist: {}",
        path_ref.display()
    );
    let image = load_image(path_ref)
        .with_context(|| format!("failed to load image from {}", path_ref.display()))?;
    preprocess_dynamic_image(&image, config)
}

/// Preprocess an in-memory image.
pub fn preprocess_dynamic_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<Tensor> {
    let _guard = timing_guard("mdframes_core::preprocess_dynamic_image", log::Level::Trace);
    let InputSize {
        width: input_w,
        height: input_h,
    } = config.input_size;
    anyhow::ensure!(
        input_w > 0 && input_h > 0,
        "input dimensions must be greater than zero"
    );

    let (orig_w, orig_h) = image.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "source image dimensions must be greater than zero"
    );

    let resized: Cow<'_, RgbImage> = if (orig_w, orig_h) == (input_w, input_h) {
        match image.as_rgb8() {
            Some(rgb) => Cow::Borrowed(rgb),
            None => Cow::Owned(image.to_rgb8()),
        }
    } else {
        Cow::Owned(
            image
                .resize_exact(input_w, input_h, config.filter)
                .to_rgb8(),
        )
    };

    let chw = rgb_to_chw(&resized, 1.0 / 255.0);
    let shape = [1usize, 3, input_h as usize, input_w as usize];
    let (data, offset) = chw.into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    Tensor::from_shape(&shape, &data).map_err(|e| anyhow::anyhow!("failed to build tensor: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn builds_nchw_tensor_scaled_to_unit_range() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([255, 0, 51])));
        let config = PreprocessConfig {
            input_size: InputSize::new(8, 4),
            ..Default::default()
        };
        let tensor = preprocess_dynamic_image(&image, &config).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 4, 8]);

        let data = tensor.as_slice::<f32>().unwrap();
        let plane = 8 * 4;
        assert!((data[0] - 1.0).abs() < 1e-6);
        assert_eq!(data[plane], 0.0);
        assert!((data[2 * plane] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn stretches_to_model_input() {
        let gray = image::GrayImage::from_pixel(100, 50, image::Luma([255]));
        let image = DynamicImage::ImageLuma8(gray);
        let config = PreprocessConfig {
            input_size: InputSize::new(32, 32),
            ..Default::default()
        };
        let tensor = preprocess_dynamic_image(&image, &config).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
        let data = tensor.as_slice::<f32>().unwrap();
        assert!(data.iter().all(|v| (v - 1.0).abs() < 0.01));
    }

    #[test]
    fn rejects_zero_input_size() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let config = PreprocessConfig {
            input_size: InputSize::new(0, 4),
            ..Default::default()
        };
        assert!(preprocess_dynamic_image(&image, &config).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(preprocess_image("does/not/exist.png", &PreprocessConfig::default()).is_err());
    }
}
