//! Label generation: detector output or located particles to one label file per frame.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::Result;
use log::{info, warn};
use mdframes_utils::{EmptyFramePolicy, ensure_dir, load_grayscale, resolve_inputs, timing_guard};
use ndarray::Array3;
use serde::Serialize;

use crate::{
    detector::Detector,
    labels::{LabelRecord, write_label_file},
    locate::{ParticleLocator, group_by_frame},
    naming::label_path,
};

/// Frame rasters consumed by the labelers and the overlay renderer.
pub const FRAME_EXTENSIONS: &[&str] = &["png"];

/// Summary of one labeling run.
#[derive(Debug, Clone, Serialize)]
pub struct LabelReport {
    pub output_dir: PathBuf,
    /// Images considered.
    pub images: usize,
    pub files_written: usize,
    pub records_written: usize,
    /// Frames with no records, whether or not a file was written for them.
    pub empty_frames: usize,
    /// Images that failed and produced no file.
    pub skipped: Vec<PathBuf>,
}

impl LabelReport {
    fn new(output_dir: &Path, images: usize) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            images,
            files_written: 0,
            records_written: 0,
            empty_frames: 0,
            skipped: Vec::new(),
        }
    }

    fn record(
        &mut self,
        index: usize,
        records: &[LabelRecord],
        policy: EmptyFramePolicy,
    ) -> Result<()> {
        if records.is_empty() {
            self.empty_frames += 1;
            if policy == EmptyFramePolicy::Skip {
                return Ok(());
            }
        }
        write_label_file(&label_path(&self.output_dir, index), records)?;
        self.files_written += 1;
        self.records_written += records.len();
        Ok(())
    }
}

/// Run `detector` on every frame and write `frame_{i:05}.txt` for image `i` of the sorted
/// listing.
///
/// A frame whose inference fails is logged and skipped; the run continues.
pub fn label_with_model(
    input_path: &Path,
    output_label_folder: &Path,
    detector: &dyn Detector,
    empty_frames: EmptyFramePolicy,
) -> Result<LabelReport> {
    let _guard = timing_guard("mdframes_core::label_with_model", log::Level::Debug);
    let images = resolve_inputs(input_path, FRAME_EXTENSIONS)?;
    ensure_dir(output_label_folder)?;

    let mut report = LabelReport::new(output_label_folder, images.len());
    for (index, image) in images.iter().enumerate() {
        let detections = match detector.detect(image) {
            Ok(detections) => detections,
            Err(err) => {
                warn!("Inference failed for {}: {err:#}", image.display());
                report.skipped.push(image.clone());
                continue;
            }
        };
        let records: Vec<LabelRecord> = detections.iter().map(|d| d.to_label()).collect();
        report.record(index, &records, empty_frames)?;
        info!("Processed {} ({} detections)", image.display(), records.len());
    }

    info!(
        "Labeled {} of {} images into {}",
        report.files_written,
        report.images,
        output_label_folder.display()
    );
    Ok(report)
}

/// Locate particles across the frame sequence and write a `box_size` square, centered on each
/// particle, into `frame_{id:05}.txt`.
///
/// Every frame id the locator reports gets a file, even one past the listed images. Boxes are
/// not clamped to the image.
pub fn label_with_tracker(
    input_path: &Path,
    output_label_folder: &Path,
    locator: &dyn ParticleLocator,
    box_size: f32,
    empty_frames: EmptyFramePolicy,
) -> Result<LabelReport> {
    let _guard = timing_guard("mdframes_core::label_with_tracker", log::Level::Debug);
    anyhow::ensure!(
        box_size.is_finite() && box_size > 0.0,
        "box size must be a positive number of pixels (got {box_size})"
    );
    let images = resolve_inputs(input_path, FRAME_EXTENSIONS)?;
    let (frames, (width, height)) = load_grayscale_stack(&images)?;
    ensure_dir(output_label_folder)?;

    let observations = locator.locate(&frames)?;
    let grouped = group_by_frame(&observations);

    let mut frame_ids: BTreeSet<usize> = grouped.keys().copied().collect();
    if empty_frames == EmptyFramePolicy::WriteEmpty {
        frame_ids.extend(0..images.len());
    }

    let mut report = LabelReport::new(output_label_folder, images.len());
    let box_size = box_size as f64;
    for frame in frame_ids {
        if frame >= images.len() {
            warn!(
                "Locator reported frame {frame} but only {} images were listed",
                images.len()
            );
        }
        let records: Vec<LabelRecord> = grouped
            .get(&frame)
            .map(|particles| {
                particles
                    .iter()
                    .map(|p| LabelRecord::centered(0, p.x, p.y, box_size, box_size, width, height))
                    .collect()
            })
            .unwrap_or_default();
        report.record(frame, &records, empty_frames)?;
    }

    info!(
        "Found {} particles in {} of {} frames; labels saved to {}",
        observations.len(),
        grouped.len(),
        images.len(),
        output_label_folder.display()
    );
    Ok(report)
}

/// Load every image as 8-bit grayscale into a `(frame, row, col)` array.
///
/// Returns the array and the shared `(width, height)`.
pub fn load_grayscale_stack(images: &[PathBuf]) -> Result<(Array3<f32>, (u32, u32))> {
    let first = images
        .first()
        .ok_or_else(|| anyhow::anyhow!("no frames to load"))?;
    let (width, height) = load_grayscale(first)?.dimensions();

    let mut frames = Array3::<f32>::zeros((images.len(), height as usize, width as usize));
    for (index, path) in images.iter().enumerate() {
        let gray = load_grayscale(path)?;
        anyhow::ensure!(
            gray.dimensions() == (width, height),
            "{} is {}x{} but the first frame is {width}x{height}",
            path.display(),
            gray.width(),
            gray.height()
        );
        let mut slot = frames.index_axis_mut(ndarray::Axis(0), index);
        for (x, y, pixel) in gray.enumerate_pixels() {
            slot[(y as usize, x as usize)] = pixel[0] as f32;
        }
    }
    Ok((frames, (width, height)))
}
