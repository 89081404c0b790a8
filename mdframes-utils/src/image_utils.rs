use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use ndarray::Array3;

/// Load an image from disk into memory.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Load an image and convert it to 8-bit RGB.
pub fn load_rgb<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    Ok(load_image(path)?.to_rgb8())
}

/// Load an image and convert it to 8-bit single-channel luminance.
pub fn load_grayscale<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    Ok(load_image(path)?.to_luma8())
}

/// Map a user-facing format name or extension (`png`, `.jpg`, `TIFF`) to an encoder.
pub fn output_format_from_str(name: &str) -> Result<ImageFormat> {
    let ext = name.trim().trim_start_matches('.');
    ImageFormat::from_extension(ext)
        .with_context(|| format!("unsupported output image format '{name}'"))
}

/// Convert an RGB image into a planar `[3, H, W]` array, each sample multiplied by `scale`.
pub fn rgb_to_chw(image: &RgbImage, scale: f32) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for c in 0..3 {
            array[(c, yi, xi)] = pixel[c] as f32 * scale;
        }
    }
    array
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_accepts_common_spellings() {
        assert_eq!(output_format_from_str("png").unwrap(), ImageFormat::Png);
        assert_eq!(output_format_from_str(".JPG").unwrap(), ImageFormat::Jpeg);
        assert_eq!(output_format_from_str("tif").unwrap(), ImageFormat::Tiff);
        assert!(output_format_from_str("nope").is_err());
    }

    #[test]
    fn rgb_to_chw_keeps_channel_order() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, image::Rgb([255, 0, 51]));
        let chw = rgb_to_chw(&image, 1.0 / 255.0);
        assert_eq!(chw.shape(), &[3, 1, 2]);
        assert!((chw[(0, 0, 1)] - 1.0).abs() < 1e-6);
        assert_eq!(chw[(1, 0, 1)], 0.0);
        assert!((chw[(2, 0, 1)] - 0.2).abs() < 1e-6);
        assert_eq!(chw[(0, 0, 0)], 0.0);
    }

    #[test]
    fn grayscale_loader_drops_color() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.png");
        RgbImage::from_pixel(3, 2, image::Rgb([10, 200, 30]))
            .save(&path)
            .unwrap();
        let gray = load_grayscale(&path).unwrap();
        assert_eq!(gray.dimensions(), (3, 2));
        let rgb = load_rgb(&path).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 200, 30]);
    }
}
