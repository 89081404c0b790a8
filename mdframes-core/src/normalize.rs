//! Conversion of raw microscope frames into 8-bit RGB images.

use anyhow::Result;
use image::RgbImage;

use crate::stack::{Frame, Samples};

/// Scale a frame's samples onto `0..=255`.
///
/// 8-bit frames are returned unchanged. Anything else is min-max stretched over the whole
/// frame (all channels together) and rounded. A constant frame has no range to stretch, so
/// its values are saturated into `0..=255` instead. Non-finite samples map to 0.
pub fn normalize_to_u8(frame: &Frame) -> Vec<u8> {
    if let Samples::U8(data) = frame.samples() {
        return data.clone();
    }

    let values = frame.samples().to_f64();
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    if !range.is_finite() || range <= 0.0 {
        return values.into_iter().map(saturate).collect();
    }

    let scale = 255.0 / range;
    values
        .into_iter()
        .map(|v| if v.is_finite() { saturate((v - min) * scale) } else { 0 })
        .collect()
}

fn saturate(v: f64) -> u8 {
    if v.is_finite() {
        v.round().clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

/// Normalize a frame and lay it out as RGB.
///
/// Gray frames are replicated into all three channels; gray+alpha keeps the gray channel and
/// RGBA drops alpha.
pub fn frame_to_rgb(frame: &Frame) -> Result<RgbImage> {
    let bytes = normalize_to_u8(frame);
    let rgb: Vec<u8> = match frame.channels() {
        1 => bytes.iter().flat_map(|&v| [v, v, v]).collect(),
        2 => bytes.chunks_exact(2).flat_map(|px| [px[0], px[0], px[0]]).collect(),
        3 => bytes,
        4 => bytes
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        other => anyhow::bail!("cannot convert a {other}-channel frame to RGB"),
    };
    RgbImage::from_raw(frame.width(), frame.height(), rgb)
        .ok_or_else(|| anyhow::anyhow!("normalized buffer does not match frame dimensions"))
}
