//! ONNX Runtime backend.

use super::engine::{EngineError, EngineLoader, InferenceEngine};
use super::runtime::ImageTensor;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::fmt::Display;
use std::path::Path;
use tracing::debug;

/// Loads `.onnx` models into ONNX Runtime sessions.
#[derive(Clone, Copy, Debug)]
pub struct OnnxLoader {
    intra_threads: usize,
}

impl Default for OnnxLoader {
    fn default() -> Self {
        Self { intra_threads: 4 }
    }
}

impl OnnxLoader {
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }
}

impl EngineLoader for OnnxLoader {
    type Engine = OnnxEngine;

    fn load(&self, model_path: &Path) -> Result<OnnxEngine, EngineError> {
        let model_bytes = std::fs::read(model_path)
            .map_err(|e| EngineError::with_source("failed to read model file", e))?;

        let session = Session::builder()
            .map_err(ort_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_error)?
            .with_intra_threads(self.intra_threads)
            .map_err(ort_error)?
            .commit_from_memory(&model_bytes)
            .map_err(ort_error)?;

        debug!(
            path = %model_path.display(),
            inputs = session.inputs.len(),
            outputs = session.outputs.len(),
            "created ONNX session"
        );
        Ok(OnnxEngine { session })
    }
}

/// A model running in an ONNX Runtime session.
pub struct OnnxEngine {
    session: Session,
}

impl InferenceEngine for OnnxEngine {
    fn input_shape(&self) -> Option<Vec<i64>> {
        self.session
            .inputs
            .first()
            .and_then(|input| input.input_type.tensor_shape())
            .map(|shape| shape.to_vec())
    }

    fn forward(&mut self, input: &ImageTensor) -> Result<Vec<f32>, EngineError> {
        let input_name = self
            .session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let input_tensor =
            ort::value::Tensor::from_array(input.clone().into_array()).map_err(ort_error)?;

        let outputs = self
            .session
            .run(ort::inputs![input_name => input_tensor])
            .map_err(ort_error)?;

        let output = outputs
            .values()
            .next()
            .ok_or_else(|| EngineError::new("model produced no output tensor"))?;

        // [1, num_classes] and [num_classes] both flatten to the score vector.
        let (_shape, scores) = output.try_extract_tensor::<f32>().map_err(ort_error)?;
        Ok(scores.to_vec())
    }
}

fn ort_error(error: impl Display) -> EngineError {
    EngineError::new(format!("ONNX runtime error: {}", error))
}
