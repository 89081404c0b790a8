//! Core mdframes pipeline.
//!
//! Reads multi-page TIFF stacks, extracts normalized RGB frames, produces normalized
//! bounding-box label files from an ONNX detector (run with `tract-onnx`) or a particle
//! locator, and renders the labels back onto the frames.

/// High-level detector abstraction and the ONNX implementation.
pub mod detector;
/// Stack to frame-file extraction.
pub mod extract;
/// Label generation for whole frame sequences.
pub mod labeling;
/// Label records and label files.
pub mod labels;
/// Particle location on grayscale frame stacks.
pub mod locate;
/// ONNX model loading and execution.
pub mod model;
/// Frame, label, and overlay file names.
pub mod naming;
/// Bit-depth normalization.
pub mod normalize;
/// Label overlay rendering.
pub mod overlay;
/// Detection post-processing (score filtering, NMS).
pub mod postprocess;
/// Image pre-processing (resizing, tensor conversion).
pub mod preprocess;
/// TIFF stack reading.
pub mod stack;

pub use detector::{Detector, NormalizedDetection, OnnxDetector};
pub use extract::{ExtractReport, FrameFormat, StackReport, Stride, convert_images, extract};
pub use labeling::{LabelReport, label_with_model, label_with_tracker, load_grayscale_stack};
pub use labels::{LabelRecord, PixelBox, read_label_file, write_label_file};
pub use locate::{
    CentroidLocator, LocateError, LocateParams, ParticleLocator, ParticleObservation,
    group_by_frame,
};
pub use model::OnnxModel;
pub use normalize::{frame_to_rgb, normalize_to_u8};
pub use overlay::{OverlayReport, OverlayStyle, render_overlays};
pub use postprocess::{BoundingBox, Detection, PostprocessConfig, apply_postprocess};
pub use preprocess::{InputSize, PreprocessConfig, preprocess_dynamic_image, preprocess_image};
pub use stack::{Frame, FrameStack, Samples, read_tiff_stack};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
