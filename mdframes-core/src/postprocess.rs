use std::cmp::Ordering;

use anyhow::Result;
use mdframes_utils::config::DetectorSettings;
use tract_onnx::prelude::{Tensor, tract_ndarray::ArrayView2};

/// Filtering applied to raw detector output.
#[derive(Debug, Clone)]
pub struct PostprocessConfig {
    /// Minimum class confidence for a detection to be considered valid.
    pub score_threshold: f32,
    /// IoU above which a lower-scoring box of the same class is dropped.
    pub nms_threshold: f32,
    /// The maximum number of detections to return after sorting by score (0 = no limit).
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.25,
            nms_threshold: 0.45,
            top_k: 300,
        }
    }
}

/// Axis-aligned bounding box in model-input pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// The x-coordinate of the top-left corner.
    pub x: f32,
    /// The y-coordinate of the top-left corner.
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        (self.width.max(0.0)) * (self.height.max(0.0))
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A single decoded detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub score: f32,
}

/// Decode a YOLO-style head into filtered detections.
///
/// The tensor is `[1, 4 + classes, anchors]` (or without the batch axis): rows 0..4 hold the
/// box center and size in input pixels, the remaining rows one score per class. Each anchor
/// keeps its best class; then score filtering, top-k, and per-class NMS are applied.
pub fn apply_postprocess(output: &Tensor, config: &PostprocessConfig) -> Result<Vec<Detection>> {
    let rows = detection_rows(output)?;
    anyhow::ensure!(
        rows.nrows() > 4,
        "detector output needs at least one class row (got {} rows)",
        rows.nrows()
    );

    let mut detections = Vec::new();
    for anchor in rows.columns() {
        let Some((class_id, score)) = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        else {
            continue;
        };
        if !score.is_finite() || score < config.score_threshold {
            continue;
        }
        let bbox = BoundingBox::from_center(anchor[0], anchor[1], anchor[2], anchor[3]);
        if bbox.width <= 0.0 || bbox.height <= 0.0 {
            continue;
        }
        detections.push(Detection {
            bbox,
            class_id: class_id as u32,
            score,
        });
    }

    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    if config.top_k > 0 && detections.len() > config.top_k {
        detections.truncate(config.top_k);
    }

    if config.nms_threshold > 0.0 && detections.len() > 1 {
        detections = non_max_suppression(detections, config.nms_threshold);
    }

    Ok(detections)
}

/// View the output as `[4 + classes, anchors]`.
fn detection_rows(output: &Tensor) -> Result<ArrayView2<'_, f32>> {
    let (rows, cols) = match output.shape() {
        [rows, cols] => (*rows, *cols),
        [1, rows, cols] => (*rows, *cols),
        other => anyhow::bail!(
            "detector output must have shape [C, N] or [1, C, N] (got {:?})",
            other
        ),
    };

    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("detector output is not f32: {e}"))?;

    ArrayView2::from_shape((rows, cols), slice)
        .map_err(|_| anyhow::anyhow!("detector output data is not contiguous"))
}

/// Greedy NMS; boxes of different classes never suppress each other.
fn non_max_suppression(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    let mut result: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections.drain(..) {
        let suppressed = result.iter().any(|kept| {
            kept.class_id == detection.class_id && detection.bbox.iou(&kept.bbox) > threshold
        });
        if !suppressed {
            result.push(detection);
        }
    }
    result
}

impl From<&DetectorSettings> for PostprocessConfig {
    fn from(settings: &DetectorSettings) -> Self {
        PostprocessConfig {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}
