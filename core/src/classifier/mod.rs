//! Single-label image classification with a bundled pretrained model.
//!
//! The pipeline for one image is:
//! 1. decode the image file (never cached)
//! 2. resize and normalize it into an [`ImageTensor`]
//! 3. make sure the model asset is materialized in private storage
//! 4. load the model (once, then reused)
//! 5. run a forward pass and pick the best class
//!
//! # Configuration
//!
//! ```toml
//! bundle_dir = "assets"
//!
//! [model]
//! asset = "model.onnx"
//! labels_file = "labels.txt"
//!
//! [model.input]
//! width = 400
//! height = 400
//! ```
//!
//! The ONNX Runtime backend lives behind the `onnx` cargo feature. Without
//! it, any [`EngineLoader`] can be plugged in.

mod config;
mod decision;
mod engine;
mod labels;
#[cfg(feature = "onnx")]
mod onnx;
mod runtime;

pub use config::{
    ClassifierConfig, ConfigError, ModelConfig, ModelInputSpec, TensorLayout, DEFAULT_CONFIG_FILE,
    DEFAULT_MODEL_ASSET,
};
pub use decision::{argmax, decide, top_k, DecisionError, Prediction};
pub use engine::{EngineError, EngineLoader, FixedScoresEngine, FixedScoresLoader, InferenceEngine};
pub use labels::{
    load_labels, load_labels_from_csv, load_labels_from_file, load_labels_from_json,
    load_labels_from_text, LabelError, LabelTable, DEFAULT_LABELS,
};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxEngine, OnnxLoader};
pub use runtime::{
    load_image, softmax, ClassifierError, ImageTensor, PreprocessError, Preprocessor,
    IMAGE_NET_MEAN, IMAGE_NET_STD,
};

use crate::assets::{AssetStore, BundleDir};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Classifier that owns the preprocessing contract, the label table and a
/// lazily loaded inference engine.
pub struct ImageClassifier<L: EngineLoader> {
    assets: AssetStore,
    preprocessor: Preprocessor,
    labels: LabelTable,
    model_asset: String,
    loader: L,
    engine: Option<L::Engine>,
}

impl<L: EngineLoader> ImageClassifier<L> {
    pub fn new(
        assets: AssetStore,
        preprocessor: Preprocessor,
        labels: LabelTable,
        model_asset: impl Into<String>,
        loader: L,
    ) -> Self {
        Self {
            assets,
            preprocessor,
            labels,
            model_asset: model_asset.into(),
            loader,
            engine: None,
        }
    }

    /// Create a classifier from a configuration. The model itself is not
    /// loaded until the first classification.
    pub fn from_config(config: &ClassifierConfig, loader: L) -> Result<Self, ClassifierError> {
        let assets = AssetStore::new(BundleDir::new(&config.bundle_dir), config.files_dir());
        let preprocessor = Preprocessor::new(config.model.input.clone())?;
        let labels = load_labels(config)?;
        Ok(Self::new(
            assets,
            preprocessor,
            labels,
            config.model.asset.clone(),
            loader,
        ))
    }

    /// Classify the image stored at `image_path`.
    pub fn classify_path(&mut self, image_path: &Path) -> Result<Prediction, ClassifierError> {
        let scores = self.scores_path(image_path)?;
        let prediction = self.decide(&scores)?;
        debug!(
            image = %image_path.display(),
            label = %prediction.label,
            score = prediction.score,
            "classified image"
        );
        Ok(prediction)
    }

    /// The `k` best classes for the image at `image_path`, best first.
    pub fn top_k_path(
        &mut self,
        image_path: &Path,
        k: usize,
    ) -> Result<Vec<Prediction>, ClassifierError> {
        let scores = self.scores_path(image_path)?;
        self.rank(&scores, k)
    }

    /// Raw per-class scores from one forward pass over the image at
    /// `image_path`.
    pub fn scores_path(&mut self, image_path: &Path) -> Result<Vec<f32>, ClassifierError> {
        let image = load_image(image_path)?;
        let tensor = self.preprocessor.to_tensor(&image)?;
        let model_path = self.ensure_model()?;

        let mut engine = match self.engine.take() {
            Some(engine) => engine,
            None => {
                let engine = self.loader.load(&model_path).map_err(|source| {
                    ClassifierError::ModelLoad {
                        path: model_path.clone(),
                        source,
                    }
                })?;
                info!(model = %model_path.display(), "loaded model");
                engine
            }
        };

        let result = run_engine(&mut engine, &tensor);
        self.engine = Some(engine);
        result
    }

    /// Winning class for scores this classifier already produced.
    pub fn decide(&self, scores: &[f32]) -> Result<Prediction, ClassifierError> {
        Ok(decision::decide(scores, &self.labels)?)
    }

    /// Ranking for scores this classifier already produced.
    pub fn rank(&self, scores: &[f32], k: usize) -> Result<Vec<Prediction>, ClassifierError> {
        Ok(decision::top_k(scores, &self.labels, k)?)
    }

    /// Materialize the model asset and return its private path.
    pub fn ensure_model(&self) -> Result<PathBuf, ClassifierError> {
        Ok(self.assets.ensure_local(&self.model_asset)?)
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn is_model_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// Loaded engine, if any.
    pub fn engine(&self) -> Option<&L::Engine> {
        self.engine.as_ref()
    }
}

fn run_engine<E: InferenceEngine>(
    engine: &mut E,
    tensor: &ImageTensor,
) -> Result<Vec<f32>, ClassifierError> {
    if let Some(expected) = engine.input_shape() {
        let actual = tensor.shape();
        if !shape_matches(&expected, &actual) {
            return Err(ClassifierError::ShapeMismatch {
                expected,
                actual: actual.to_vec(),
            });
        }
    }
    engine.forward(tensor).map_err(ClassifierError::Inference)
}

/// Non-positive dimensions are dynamic and match any size.
fn shape_matches(expected: &[i64], actual: &[usize]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(&want, &got)| want <= 0 || want as usize == got)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::EmbeddedAssets;
    use image::{Rgb, RgbImage};
    use tempfile::{tempdir, TempDir};

    fn write_photo(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(32, 24, Rgb([90, 160, 40]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        path
    }

    fn classifier(
        private: &TempDir,
        engine: FixedScoresEngine,
    ) -> ImageClassifier<FixedScoresLoader> {
        let assets = AssetStore::new(
            EmbeddedAssets::new().with(DEFAULT_MODEL_ASSET, b"opaque weights".to_vec()),
            private.path().join("files"),
        );
        ImageClassifier::new(
            assets,
            Preprocessor::default(),
            LabelTable::builtin(),
            DEFAULT_MODEL_ASSET,
            FixedScoresLoader::new(engine),
        )
    }

    #[test]
    fn end_to_end_returns_label_at_winning_index() {
        let private = tempdir().unwrap();
        let photo = write_photo(&private, "photo.png");
        let mut classifier = classifier(
            &private,
            FixedScoresEngine::new(vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0]),
        );

        let prediction = classifier.classify_path(&photo).unwrap();
        assert_eq!(prediction.index, 2);
        assert_eq!(prediction.label, DEFAULT_LABELS[2]);
        assert!(private.path().join("files").join(DEFAULT_MODEL_ASSET).exists());
    }

    #[test]
    fn model_is_loaded_once_and_reused() {
        let private = tempdir().unwrap();
        let photo = write_photo(&private, "photo.png");
        let mut classifier = classifier(
            &private,
            FixedScoresEngine::new(vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0]),
        );

        assert!(!classifier.is_model_loaded());
        classifier.classify_path(&photo).unwrap();
        classifier.classify_path(&photo).unwrap();
        assert!(classifier.is_model_loaded());
        assert_eq!(classifier.engine().unwrap().calls(), 2);
    }

    #[test]
    fn score_length_mismatch_is_reported() {
        let private = tempdir().unwrap();
        let photo = write_photo(&private, "photo.png");
        let mut classifier = classifier(&private, FixedScoresEngine::new(vec![0.1; 10]));

        let error = classifier.classify_path(&photo).unwrap_err();
        assert!(matches!(
            error,
            ClassifierError::Decision(DecisionError::LengthMismatch {
                scores: 10,
                labels: 6
            })
        ));
    }

    #[test]
    fn declared_input_shape_is_enforced() {
        let private = tempdir().unwrap();
        let photo = write_photo(&private, "photo.png");
        let engine = FixedScoresEngine::new(vec![1.0; 6]).with_input_shape(vec![1, 3, 224, 224]);
        let mut classifier = classifier(&private, engine);

        let error = classifier.classify_path(&photo).unwrap_err();
        assert!(matches!(error, ClassifierError::ShapeMismatch { .. }));
    }

    #[test]
    fn dynamic_dimensions_match_anything() {
        assert!(shape_matches(&[-1, 3, 400, 400], &[1, 3, 400, 400]));
        assert!(shape_matches(&[0, 3, -1, -1], &[1, 3, 17, 9]));
        assert!(!shape_matches(&[1, 3, 400], &[1, 3, 400, 400]));
        assert!(!shape_matches(&[1, 400, 400, 3], &[1, 3, 400, 400]));
    }

    #[test]
    fn missing_model_asset_is_a_distinct_error() {
        let private = tempdir().unwrap();
        let photo = write_photo(&private, "photo.png");
        let mut classifier = ImageClassifier::new(
            AssetStore::new(EmbeddedAssets::new(), private.path().join("files")),
            Preprocessor::default(),
            LabelTable::builtin(),
            DEFAULT_MODEL_ASSET,
            FixedScoresLoader::new(FixedScoresEngine::new(vec![1.0; 6])),
        );

        let error = classifier.classify_path(&photo).unwrap_err();
        assert!(matches!(error, ClassifierError::Asset(_)));
        assert!(!classifier.is_model_loaded());
    }

    #[test]
    fn undecodable_image_fails_before_model_load() {
        let private = tempdir().unwrap();
        let broken = private.path().join("broken");
        std::fs::write(&broken, b"garbage").unwrap();
        let mut classifier = classifier(&private, FixedScoresEngine::new(vec![1.0; 6]));

        let error = classifier.classify_path(&broken).unwrap_err();
        assert!(matches!(
            error,
            ClassifierError::Preprocess(PreprocessError::Decode { .. })
        ));
        assert!(!classifier.is_model_loaded());
    }

    #[test]
    fn from_config_reads_labels_from_bundle() {
        let bundle = tempdir().unwrap();
        let data = tempdir().unwrap();
        std::fs::write(bundle.path().join("model.onnx"), b"weights").unwrap();
        std::fs::write(bundle.path().join("labels.txt"), "walk\nride\n").unwrap();
        let photo = write_photo(&data, "photo.png");

        let mut config = ClassifierConfig::default();
        config.bundle_dir = bundle.path().to_path_buf();
        config.data_dir = data.path().join("state");
        config.model.labels_file = Some(PathBuf::from("labels.txt"));

        let mut classifier = ImageClassifier::from_config(
            &config,
            FixedScoresLoader::new(FixedScoresEngine::new(vec![0.2, 0.8])),
        )
        .unwrap();
        let ranked = classifier.top_k_path(&photo, 2).unwrap();
        assert_eq!(ranked[0].label, "ride");
        assert_eq!(ranked[1].label, "walk");
        assert!(config.files_dir().join("model.onnx").exists());
    }
}
