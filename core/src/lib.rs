//! Core pipeline for trafficmode.
//!
//! This crate imports picked photos into private storage, materializes the
//! bundled model, turns images into normalized tensors and maps the model's
//! scores to a label. The [`Session`] state machine ties the steps together
//! for front ends; the CLI is one such front end.

pub mod assets;
pub mod classifier;
pub mod copy;
pub mod import;
pub mod reporting;
pub mod session;

pub use assets::{AssetError, AssetSource, AssetStore, BundleDir, EmbeddedAssets};
pub use classifier::{
    argmax, decide, load_image, top_k, ClassifierConfig, ClassifierError, DecisionError,
    EngineError, EngineLoader, FixedScoresEngine, FixedScoresLoader, ImageClassifier, ImageTensor,
    InferenceEngine, LabelTable, Prediction, Preprocessor,
};
#[cfg(feature = "onnx")]
pub use classifier::{OnnxEngine, OnnxLoader};
pub use copy::copy_chunked;
pub use import::{
    FileResolver, ImageImporter, ImportError, ResourceHandle, ResourceResolver, RetentionPolicy,
};
pub use reporting::{
    read_report, write_report, ClassificationRecord, ClassificationReport, ReportingError,
};
pub use session::{Session, SessionError, SessionState};
