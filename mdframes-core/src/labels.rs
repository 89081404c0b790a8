//! Normalized bounding-box label files.
//!
//! One record per line: `<class> <x_center> <y_center> <width> <height>`, the geometric fields
//! relative to image width/height and printed with exactly six fractional digits. This is the
//! layout object-detection training tools read, so it must not drift.

use std::{
    fmt,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;

/// One normalized box. Values are never clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelRecord {
    pub class_id: u32,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

/// Corner coordinates in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LabelRecord {
    /// Box of `box_w` x `box_h` pixels centered on `(x, y)` in an image of `image_w` x `image_h`.
    pub fn centered(
        class_id: u32,
        x: f64,
        y: f64,
        box_w: f64,
        box_h: f64,
        image_w: u32,
        image_h: u32,
    ) -> Self {
        let (iw, ih) = (image_w as f64, image_h as f64);
        Self {
            class_id,
            x_center: x / iw,
            y_center: y / ih,
            width: box_w / iw,
            height: box_h / ih,
        }
    }

    /// Build a record from pixel-space corners.
    pub fn from_pixel_box(class_id: u32, bbox: PixelBox, image_w: u32, image_h: u32) -> Self {
        Self::centered(
            class_id,
            (bbox.x1 + bbox.x2) / 2.0,
            (bbox.y1 + bbox.y2) / 2.0,
            bbox.x2 - bbox.x1,
            bbox.y2 - bbox.y1,
            image_w,
            image_h,
        )
    }

    /// Project back onto an image of `image_w` x `image_h` pixels.
    pub fn to_pixel_box(&self, image_w: u32, image_h: u32) -> PixelBox {
        let (iw, ih) = (image_w as f64, image_h as f64);
        PixelBox {
            x1: (self.x_center - self.width / 2.0) * iw,
            y1: (self.y_center - self.height / 2.0) * ih,
            x2: (self.x_center + self.width / 2.0) * iw,
            y2: (self.y_center + self.height / 2.0) * ih,
        }
    }

    /// Parse one line. `None` unless it has exactly five whitespace-separated, parsable tokens.
    pub fn parse_line(line: &str) -> Option<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [class, xc, yc, w, h] = tokens.as_slice() else {
            return None;
        };
        let class_id = class
            .parse::<u32>()
            .ok()
            .or_else(|| {
                class
                    .parse::<f64>()
                    .ok()
                    .filter(|c| c.fract() == 0.0 && *c >= 0.0 && *c <= u32::MAX as f64)
                    .map(|c| c as u32)
            })?;
        Some(Self {
            class_id,
            x_center: xc.parse().ok()?,
            y_center: yc.parse().ok()?,
            width: w.parse().ok()?,
            height: h.parse().ok()?,
        })
    }
}

impl fmt::Display for LabelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }
}

/// Write `records` to `path`, one per line, replacing any existing file.
///
/// An empty slice produces an empty file.
pub fn write_label_file(path: &Path, records: &[LabelRecord]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        writeln!(writer, "{record}")
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

/// Read a label file, skipping malformed lines.
///
/// Lines that are not valid UTF-8 count as malformed.
pub fn read_label_file(path: &Path) -> Result<Vec<LabelRecord>> {
    let contents = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_label_bytes(&contents, path))
}

fn parse_label_bytes(contents: &[u8], origin: &Path) -> Vec<LabelRecord> {
    contents
        .split(|&b| b == b'\n')
        .enumerate()
        .filter_map(|(no, raw)| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let record = match std::str::from_utf8(raw) {
                Ok(line) if line.trim().is_empty() => return None,
                Ok(line) => LabelRecord::parse_line(line),
                Err(_) => None,
            };
            if record.is_none() {
                debug!(
                    "Skipping malformed label line {} in {}: {:?}",
                    no + 1,
                    origin.display(),
                    String::from_utf8_lossy(raw)
                );
            }
            record
        })
        .collect()
}
