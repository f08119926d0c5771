//! Selection and classification state machine.
//!
//! ```text
//! Idle --select--> ImageSelected --classify--> Classifying --> Classified
//!                      ^                           |               |
//!                      +-------- failure ----------+               |
//!                      +--------------- select / classify ---------+
//! ```
//!
//! Failures never discard the selected image: an import failure keeps the
//! previous state and a classification failure returns to `ImageSelected`.

use crate::classifier::{ClassifierError, EngineLoader, ImageClassifier, Prediction};
use crate::import::{ImageImporter, ImportError, ResourceHandle};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Idle,
    ImageSelected {
        image: PathBuf,
    },
    Classifying {
        image: PathBuf,
    },
    Classified {
        image: PathBuf,
        prediction: Prediction,
        /// Raw scores behind `prediction`, kept for ranking.
        scores: Vec<f32>,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ImageSelected { .. } => "image-selected",
            Self::Classifying { .. } => "classifying",
            Self::Classified { .. } => "classified",
        }
    }

    /// The currently selected image, if any.
    pub fn image(&self) -> Option<&Path> {
        match self {
            Self::Idle => None,
            Self::ImageSelected { image }
            | Self::Classifying { image }
            | Self::Classified { image, .. } => Some(image),
        }
    }

    /// Whether classification may be triggered from this state.
    pub fn can_classify(&self) -> bool {
        matches!(self, Self::ImageSelected { .. } | Self::Classified { .. })
    }
}

/// One user's gallery session: the picked image and its latest result.
pub struct Session<L: EngineLoader> {
    importer: ImageImporter,
    classifier: ImageClassifier<L>,
    state: SessionState,
}

impl<L: EngineLoader> Session<L> {
    pub fn new(importer: ImageImporter, classifier: ImageClassifier<L>) -> Self {
        Self {
            importer,
            classifier,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Label of the last successful classification.
    pub fn label(&self) -> Option<&str> {
        match &self.state {
            SessionState::Classified { prediction, .. } => Some(&prediction.label),
            _ => None,
        }
    }

    /// Import the picked image and make it the current selection.
    pub fn select_image(&mut self, handle: &ResourceHandle) -> Result<&Path, SessionError> {
        self.ensure_idle_pipeline()?;
        let image = self.importer.import_and_copy(handle)?;
        self.transition(SessionState::ImageSelected { image });
        self.state.image().ok_or(SessionError::NoImage)
    }

    /// Classify the selected image.
    pub fn classify(&mut self) -> Result<&Prediction, SessionError> {
        self.ensure_idle_pipeline()?;
        if !self.state.can_classify() {
            return Err(SessionError::NoImage);
        }
        let image = self
            .state
            .image()
            .map(Path::to_path_buf)
            .ok_or(SessionError::NoImage)?;

        self.transition(SessionState::Classifying {
            image: image.clone(),
        });

        let outcome = self.classifier.scores_path(&image).and_then(|scores| {
            let prediction = self.classifier.decide(&scores)?;
            Ok((prediction, scores))
        });

        match outcome {
            Ok((prediction, scores)) => {
                debug!(
                    image = %image.display(),
                    label = %prediction.label,
                    score = prediction.score,
                    "classified image"
                );
                self.transition(SessionState::Classified {
                    image,
                    prediction,
                    scores,
                });
                match &self.state {
                    SessionState::Classified { prediction, .. } => Ok(prediction),
                    _ => Err(SessionError::NoImage),
                }
            }
            Err(error) => {
                self.transition(SessionState::ImageSelected { image });
                Err(SessionError::Classify(error))
            }
        }
    }

    /// The `k` best classes for the classified image, ranked from the scores
    /// of the last classification. Does not change state.
    pub fn ranked(&self, k: usize) -> Result<Vec<Prediction>, SessionError> {
        match &self.state {
            SessionState::Classified { scores, .. } => self
                .classifier
                .rank(scores, k)
                .map_err(SessionError::Classify),
            SessionState::Classifying { .. } => Err(SessionError::Busy),
            _ => Err(SessionError::NoImage),
        }
    }

    /// Drop the selection and return to `Idle`.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.ensure_idle_pipeline()?;
        self.importer.release_current();
        self.transition(SessionState::Idle);
        Ok(())
    }

    pub fn importer(&self) -> &ImageImporter {
        &self.importer
    }

    pub fn classifier(&self) -> &ImageClassifier<L> {
        &self.classifier
    }

    fn ensure_idle_pipeline(&self) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Classifying { .. }) {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = self.state.name(), to = next.name(), "session transition");
        self.state = next;
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no image selected")]
    NoImage,
    #[error("a classification is already running")]
    Busy,
    #[error("import failed, pick the image again: {0}")]
    Import(#[from] ImportError),
    #[error("classification failed: {0}")]
    Classify(#[source] ClassifierError),
}
