//! Inference engine seam.
//!
//! The network is an opaque artifact: the pipeline only needs a way to load
//! it from a path and to run one forward pass.

use super::runtime::ImageTensor;
use std::path::Path;
use thiserror::Error;

/// A loaded, ready-to-run classification model.
pub trait InferenceEngine {
    /// Shape the model declares for its first input, if it declares one.
    /// Dynamic dimensions are reported as `-1`.
    fn input_shape(&self) -> Option<Vec<i64>> {
        None
    }

    /// Run a forward pass and return the per-class scores.
    fn forward(&mut self, input: &ImageTensor) -> Result<Vec<f32>, EngineError>;
}

/// Loads an [`InferenceEngine`] from a model file.
pub trait EngineLoader {
    type Engine: InferenceEngine;

    fn load(&self, model_path: &Path) -> Result<Self::Engine, EngineError>;
}

/// Engine that ignores its input and always returns the same scores.
#[derive(Clone, Debug)]
pub struct FixedScoresEngine {
    scores: Vec<f32>,
    input_shape: Option<Vec<i64>>,
    calls: usize,
}

impl FixedScoresEngine {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            input_shape: None,
            calls: 0,
        }
    }

    pub fn with_input_shape(mut self, shape: Vec<i64>) -> Self {
        self.input_shape = Some(shape);
        self
    }

    /// Number of forward passes run so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl InferenceEngine for FixedScoresEngine {
    fn input_shape(&self) -> Option<Vec<i64>> {
        self.input_shape.clone()
    }

    fn forward(&mut self, _input: &ImageTensor) -> Result<Vec<f32>, EngineError> {
        self.calls += 1;
        Ok(self.scores.clone())
    }
}

/// Loader for [`FixedScoresEngine`]. The model file must exist and be
/// non-empty; its contents are not interpreted.
#[derive(Clone, Debug)]
pub struct FixedScoresLoader {
    engine: FixedScoresEngine,
}

impl FixedScoresLoader {
    pub fn new(engine: FixedScoresEngine) -> Self {
        Self { engine }
    }
}

impl EngineLoader for FixedScoresLoader {
    type Engine = FixedScoresEngine;

    fn load(&self, model_path: &Path) -> Result<Self::Engine, EngineError> {
        let metadata = std::fs::metadata(model_path)
            .map_err(|e| EngineError::with_source("cannot read model file", e))?;
        if metadata.len() == 0 {
            return Err(EngineError::new("model file is empty"));
        }
        Ok(self.engine.clone())
    }
}

/// Error raised by an inference backend.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::runtime::Preprocessor;
    use image::DynamicImage;
    use tempfile::tempdir;

    #[test]
    fn fixed_engine_returns_configured_scores() {
        let tensor = Preprocessor::default()
            .to_tensor(&DynamicImage::new_rgb8(2, 2))
            .unwrap();
        let mut engine = FixedScoresEngine::new(vec![0.0, 0.0, 1.0]);
        assert_eq!(engine.forward(&tensor).unwrap(), vec![0.0, 0.0, 1.0]);
        assert_eq!(engine.calls(), 1);
        assert!(engine.input_shape().is_none());
    }

    #[test]
    fn loader_requires_a_non_empty_model_file() {
        let dir = tempdir().unwrap();
        let loader = FixedScoresLoader::new(FixedScoresEngine::new(vec![1.0]));

        let missing = dir.path().join("model.onnx");
        assert!(loader.load(&missing).is_err());

        std::fs::write(&missing, b"").unwrap();
        assert!(loader.load(&missing).is_err());

        std::fs::write(&missing, b"weights").unwrap();
        assert!(loader.load(&missing).is_ok());
    }
}
