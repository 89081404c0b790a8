//! Draw label boxes back onto their frames for visual checking.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use log::{info, warn};
use mdframes_utils::{
    RgbColor, config::OverlaySettings, ensure_dir, load_rgb, resolve_inputs, timing_guard,
};
use serde::Serialize;

use crate::{
    labeling::FRAME_EXTENSIONS,
    labels::{LabelRecord, PixelBox, read_label_file},
    naming::{label_path, overlay_file_name},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub color: RgbColor,
    /// Outline width in pixels, grown inward from the box corners.
    pub thickness: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: RgbColor::RED,
            thickness: 2,
        }
    }
}

impl From<&OverlaySettings> for OverlayStyle {
    fn from(settings: &OverlaySettings) -> Self {
        Self {
            color: settings.color,
            thickness: settings.thickness,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlayReport {
    pub output_dir: PathBuf,
    pub written: Vec<PathBuf>,
    /// Frames written without a matching label file.
    pub unlabeled: usize,
    pub boxes_drawn: usize,
    pub failed: Vec<PathBuf>,
}

/// Render `frame_{i:05}_overlay.png` for image `i` of the sorted listing, drawing the boxes of
/// `frame_{i:05}.txt` when it exists.
///
/// A single file is taken as image 0 whatever its raster type; directories are filtered to
/// `.png` frames. Images that cannot be decoded are logged and skipped. An unreadable label
/// file is logged and its frame is written without boxes.
pub fn render_overlays(
    input_path: &Path,
    label_folder: &Path,
    output_folder: &Path,
    style: &OverlayStyle,
) -> Result<OverlayReport> {
    let _guard = timing_guard("mdframes_core::render_overlays", log::Level::Debug);
    let images = if input_path.is_file() {
        vec![input_path.to_path_buf()]
    } else {
        resolve_inputs(input_path, FRAME_EXTENSIONS)?
    };
    ensure_dir(output_folder)?;

    let mut report = OverlayReport {
        output_dir: output_folder.to_path_buf(),
        written: Vec::with_capacity(images.len()),
        unlabeled: 0,
        boxes_drawn: 0,
        failed: Vec::new(),
    };

    for (index, image_path) in images.iter().enumerate() {
        let mut image = match load_rgb(image_path) {
            Ok(image) => image,
            Err(err) => {
                warn!("Skipping {}: {err:#}", image_path.display());
                report.failed.push(image_path.clone());
                continue;
            }
        };

        let labels = label_path(label_folder, index);
        if labels.is_file() {
            match read_label_file(&labels) {
                Ok(records) => report.boxes_drawn += draw_records(&mut image, &records, style),
                Err(err) => warn!("Drawing no boxes for {}: {err:#}", image_path.display()),
            }
        } else {
            report.unlabeled += 1;
        }

        let target = output_folder.join(overlay_file_name(index));
        image
            .save(&target)
            .with_context(|| format!("failed to save overlay {}", target.display()))?;
        report.written.push(target);
    }

    info!(
        "Wrote {} overlays ({} boxes) to {}",
        report.written.len(),
        report.boxes_drawn,
        output_folder.display()
    );
    Ok(report)
}

/// Draw every record onto `image`. Returns how many boxes were drawn.
pub fn draw_records(image: &mut RgbImage, records: &[LabelRecord], style: &OverlayStyle) -> usize {
    let (width, height) = image.dimensions();
    let mut drawn = 0;
    for record in records {
        if draw_box(image, record.to_pixel_box(width, height), style) {
            drawn += 1;
        }
    }
    drawn
}

/// Outline `bbox` with corners inclusive, `style.thickness` pixels wide. Parts outside the
/// image are clipped. Returns `false` if nothing could be drawn.
pub fn draw_box(image: &mut RgbImage, bbox: PixelBox, style: &OverlayStyle) -> bool {
    let (width, height) = image.dimensions();
    let pad = style.thickness as f64 + 1.0;
    let to_px = |v: f64, extent: u32| -> Option<i64> {
        v.is_finite()
            .then(|| v.round().clamp(-pad, extent as f64 + pad) as i64)
    };
    let (Some(ax), Some(ay), Some(bx), Some(by)) = (
        to_px(bbox.x1, width),
        to_px(bbox.y1, height),
        to_px(bbox.x2, width),
        to_px(bbox.y2, height),
    ) else {
        return false;
    };
    let (x1, x2) = (ax.min(bx), ax.max(bx));
    let (y1, y2) = (ay.min(by), ay.max(by));

    let color = style.color.to_rgb();
    let mut drawn = false;
    for inset in 0..style.thickness.max(1) as i64 {
        let w = x2 - x1 + 1 - 2 * inset;
        let h = y2 - y1 + 1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at((x1 + inset) as i32, (y1 + inset) as i32).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, color);
        drawn = true;
    }
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::fs;
    use tempfile::tempdir;

    const RED: [u8; 3] = [255, 0, 0];
    const BLACK: [u8; 3] = [0, 0, 0];

    fn scenario_record() -> LabelRecord {
        LabelRecord {
            class_id: 0,
            x_center: 0.5,
            y_center: 0.5,
            width: 0.2,
            height: 0.4,
        }
    }

    #[test]
    fn draws_two_pixel_outline_inside_the_corners() {
        let mut image = RgbImage::new(100, 50);
        let drawn = draw_records(&mut image, &[scenario_record()], &OverlayStyle::default());
        assert_eq!(drawn, 1);

        for (x, y) in [(40, 15), (60, 35), (41, 16), (59, 34), (50, 15), (40, 25), (60, 25)] {
            assert_eq!(image.get_pixel(x, y).0, RED, "({x}, {y})");
        }
        for (x, y) in [(39, 15), (61, 35), (42, 17), (50, 25), (40, 14)] {
            assert_eq!(image.get_pixel(x, y).0, BLACK, "({x}, {y})");
        }
    }

    #[test]
    fn boxes_past_the_edge_are_clipped() {
        let mut image = RgbImage::new(20, 20);
        let record = LabelRecord::centered(0, 0.0, 0.0, 10.0, 10.0, 20, 20);
        let style = OverlayStyle {
            color: RgbColor::new(0, 255, 0),
            thickness: 1,
        };
        assert_eq!(draw_records(&mut image, &[record], &style), 1);
        assert_eq!(image.get_pixel(5, 0).0, [0, 255, 0]);
        assert_eq!(image.get_pixel(0, 5).0, [0, 255, 0]);
        assert_eq!(image.get_pixel(6, 6).0, BLACK);
    }

    #[test]
    fn renders_labeled_and_unlabeled_frames() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        let labels = dir.path().join("labels");
        let out = dir.path().join("overlays");
        fs::create_dir_all(&frames).unwrap();
        fs::create_dir_all(&labels).unwrap();
        for name in ["frame_00000.png", "frame_00001.png"] {
            RgbImage::from_pixel(100, 50, Rgb(BLACK))
                .save(frames.join(name))
                .unwrap();
        }
        fs::write(
            labels.join("frame_00000.txt"),
            "0 0.500000 0.500000 0.200000 0.400000\nnot a label\n1 2 3\n",
        )
        .unwrap();

        let report = render_overlays(&frames, &labels, &out, &OverlayStyle::default()).unwrap();
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.boxes_drawn, 1);
        assert_eq!(report.unlabeled, 1);

        let first = image::open(out.join("frame_00000_overlay.png")).unwrap().to_rgb8();
        assert_eq!(first.get_pixel(40, 15).0, RED);
        let second = image::open(out.join("frame_00001_overlay.png")).unwrap().to_rgb8();
        assert!(second.pixels().all(|p| p.0 == BLACK));
    }

    #[test]
    fn label_files_with_invalid_bytes_still_render() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        let labels = dir.path().join("labels");
        fs::create_dir_all(&frames).unwrap();
        fs::create_dir_all(&labels).unwrap();
        for name in ["frame_00000.png", "frame_00001.png"] {
            RgbImage::from_pixel(100, 50, Rgb(BLACK))
                .save(frames.join(name))
                .unwrap();
        }
        fs::write(
            labels.join("frame_00000.txt"),
            b"0 0.500000 0.500000 0.200000 0.400000\n\xff\xfe junk\n",
        )
        .unwrap();

        let out = dir.path().join("overlays");
        let report = render_overlays(&frames, &labels, &out, &OverlayStyle::default()).unwrap();
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.boxes_drawn, 1);
        let first = image::open(out.join("frame_00000_overlay.png")).unwrap().to_rgb8();
        assert_eq!(first.get_pixel(40, 15).0, RED);
        assert!(out.join("frame_00001_overlay.png").is_file());
    }

    #[test]
    fn single_file_of_any_raster_type_is_frame_zero() {
        let dir = tempdir().unwrap();
        let frame = dir.path().join("snapshot.bmp");
        RgbImage::from_pixel(100, 50, Rgb(BLACK)).save(&frame).unwrap();
        let labels = dir.path().join("labels");
        fs::create_dir_all(&labels).unwrap();
        fs::write(
            labels.join("frame_00000.txt"),
            "0 0.500000 0.500000 0.200000 0.400000\n",
        )
        .unwrap();

        let out = dir.path().join("overlays");
        let report = render_overlays(&frame, &labels, &out, &OverlayStyle::default()).unwrap();
        assert_eq!(report.boxes_drawn, 1);
        let image = image::open(out.join("frame_00000_overlay.png")).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(60, 35).0, RED);
    }

    #[test]
    fn undecodable_frames_are_skipped() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir_all(&frames).unwrap();
        fs::write(frames.join("a.png"), b"not a png").unwrap();
        RgbImage::new(4, 4).save(frames.join("b.png")).unwrap();

        let out = dir.path().join("overlays");
        let report =
            render_overlays(&frames, &dir.path().join("labels"), &out, &OverlayStyle::default())
                .unwrap();
        assert_eq!(report.failed, vec![frames.join("a.png")]);
        assert!(out.join("frame_00001_overlay.png").is_file());
        assert!(!out.join("frame_00000_overlay.png").exists());
    }
}
