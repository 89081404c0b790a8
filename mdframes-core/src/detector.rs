use std::path::Path;

use anyhow::Result;
use mdframes_utils::{config::DetectorSettings, timing_guard};
use serde::Serialize;
use tract_onnx::prelude::Tensor;

use crate::labels::LabelRecord;
use crate::model::OnnxModel;
use crate::postprocess::{Detection, PostprocessConfig, apply_postprocess};
use crate::preprocess::{InputSize, PreprocessConfig, preprocess_image};

/// A detection in image-relative coordinates: every geometric field is a fraction of the
/// image width or height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedDetection {
    pub class_id: u32,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f32,
}

impl NormalizedDetection {
    pub fn to_label(&self) -> LabelRecord {
        LabelRecord {
            class_id: self.class_id,
            x_center: self.x_center,
            y_center: self.y_center,
            width: self.width,
            height: self.height,
        }
    }

    /// Normalize a detection made on a model input of `input` pixels.
    pub fn from_detection(detection: &Detection, input: InputSize) -> Self {
        let (cx, cy) = detection.bbox.center();
        let (iw, ih) = (input.width as f64, input.height as f64);
        Self {
            class_id: detection.class_id,
            x_center: cx as f64 / iw,
            y_center: cy as f64 / ih,
            width: detection.bbox.width as f64 / iw,
            height: detection.bbox.height as f64 / ih,
            confidence: detection.score,
        }
    }
}

/// Anything that can find objects in an image file.
///
/// Implementations return detections that already passed their own confidence filtering.
pub trait Detector {
    fn detect(&self, image_path: &Path) -> Result<Vec<NormalizedDetection>>;
}

/// ONNX object detector coupling the model with its pre- and postprocessing settings.
#[derive(Debug)]
pub struct OnnxDetector {
    model: OnnxModel,
    preprocess: PreprocessConfig,
    postprocess: PostprocessConfig,
}

impl OnnxDetector {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        preprocess: PreprocessConfig,
        postprocess: PostprocessConfig,
    ) -> Result<Self> {
        let model = OnnxModel::load(model_path, preprocess.input_size)?;
        Ok(Self {
            model,
            preprocess,
            postprocess,
        })
    }

    /// Build a detector from persisted settings; `model_path` must be set.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self> {
        let model_path = settings
            .model_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no detector model configured"))?;
        Self::new(model_path, settings.into(), settings.into())
    }

    fn run_tensor(&self, tensor: &Tensor) -> Result<Vec<NormalizedDetection>> {
        let raw = {
            let _guard = timing_guard("mdframes_core::onnx_inference", log::Level::Debug);
            self.model.run(tensor)?
        };

        let detections = {
            let _guard = timing_guard("mdframes_core::postprocess", log::Level::Debug);
            apply_postprocess(&raw, &self.postprocess)?
        };

        let input = self.model.input_size();
        Ok(detections
            .iter()
            .map(|d| NormalizedDetection::from_detection(d, input))
            .collect())
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, image_path: &Path) -> Result<Vec<NormalizedDetection>> {
        let _guard = timing_guard("mdframes_core::detect_path", log::Level::Debug);
        let tensor = preprocess_image(image_path, &self.preprocess)?;
        self.run_tensor(&tensor)
    }
}
