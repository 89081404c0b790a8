use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::{
    DatumExt, Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact,
    TypedOp, tvec,
};

use crate::preprocess::InputSize;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A YOLO-style detector graph loaded through `tract-onnx`.
///
/// The input is pinned to `[1, 3, H, W]` at load time so exports with symbolic batch or
/// spatial axes still optimize.
#[derive(Debug)]
pub struct OnnxModel {
    runnable: RunnableModel,
    input_size: InputSize,
}

impl OnnxModel {
    /// Load and optimize the graph for a specific input size.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: InputSize) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match load_runnable_model(path, input_size, true) {
            Ok(model) => {
                debug!(
                    "Detector model {} optimized successfully ({}x{})",
                    path.display(),
                    input_size.width,
                    input_size.height
                );
                model
            }
            Err(opt_err) => {
                let optimize_msg = format!("{opt_err}");
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "Detector model {} failed optimized load ({}); falling back to decluttered graph.\nError chain:\n{}",
                    path.display(),
                    optimize_msg,
                    chain_msg.trim_end()
                );
                load_runnable_model(path, input_size, false).with_context(|| {
                    format!(
                        "fallback to decluttered detector graph failed after optimize error: {optimize_msg}"
                    )
                })?
            }
        };

        Ok(Self {
            runnable,
            input_size,
        })
    }

    /// Execute the graph on a preprocessed tensor and return its first output.
    pub fn run(&self, input: &Tensor) -> Result<Tensor> {
        let outputs = self
            .runnable
            .run(tvec![input.clone().into()])
            .map_err(|e| anyhow::anyhow!("detector execution failed: {e}"))?;

        outputs
            .into_iter()
            .next()
            .map(|value| value.into_tensor())
            .ok_or_else(|| anyhow::anyhow!("detector model produced no outputs"))
    }

    pub fn input_size(&self) -> InputSize {
        self.input_size
    }
}

fn load_runnable_model(path: &Path, input_size: InputSize, optimized: bool) -> Result<RunnableModel> {
    let shape = [
        1usize,
        3,
        input_size.height as usize,
        input_size.width as usize,
    ];
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?
        .with_input_fact(0, f32::fact(shape).into())
        .map_err(|e| anyhow::anyhow!("unable to set detector input shape {shape:?}: {e}"))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize detector graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make detector graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check detector graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter detector graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make detector graph runnable: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loading_missing_model_fails() {
        let err = OnnxModel::load("missing.onnx", InputSize::default()).unwrap_err();
        assert!(format!("{err}").contains("model file not found"));
    }

    #[test]
    fn invalid_model_produces_useful_error() {
        let mut temp = NamedTempFile::new().expect("temp file");
        temp.write_all(b"not a real onnx file")
            .expect("write mock model");

        let err = OnnxModel::load(temp.path(), InputSize::default())
            .expect_err("invalid ONNX should fail");
        let message = format!("{err:#}");
        assert!(
            message.contains("failed to parse ONNX") || message.contains("detector graph"),
            "Unexpected error message: {message}"
        );
    }
}
