//! Label tables and the loaders that build them.
//!
//! Labels come from, in order of preference:
//! 1. Inline labels in the configuration
//! 2. A labels file (CSV, plain text or JSON)
//! 3. The built-in [`DEFAULT_LABELS`]

use super::config::ClassifierConfig;
use csv::ReaderBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Transport modes recognised by the bundled traffic-mode model, in output
/// order.
pub const DEFAULT_LABELS: [&str; 6] = ["bicycle", "bus", "car", "motorcycle", "train", "walking"];

/// Ordered, non-empty list of class names indexed by model output position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Build a table, rejecting empty tables and blank labels.
    pub fn new<I, S>(labels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        if let Some(index) = labels.iter().position(|label| label.trim().is_empty()) {
            return Err(LabelError::BlankLabel(index));
        }
        Ok(Self { labels })
    }

    /// The built-in traffic-mode labels.
    pub fn builtin() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|label| label.to_string()).collect(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// Resolve the label table for a configuration.
pub fn load_labels(config: &ClassifierConfig) -> Result<LabelTable, LabelError> {
    if !config.model.labels.is_empty() {
        return LabelTable::new(config.model.labels.iter().cloned());
    }

    if let Some(label_path) = config.labels_path() {
        return load_labels_from_file(&label_path);
    }

    Ok(LabelTable::builtin())
}

/// Load labels from a file, picking the format from its extension.
pub fn load_labels_from_file(path: &Path) -> Result<LabelTable, LabelError> {
    if !path.exists() {
        return Err(LabelError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.to_lowercase());
    let labels = match extension.as_deref() {
        Some("csv") => load_labels_from_csv(path)?,
        Some("json") => load_labels_from_json(path)?,
        _ => load_labels_from_text(path)?,
    };

    if labels.is_empty() {
        return Err(LabelError::NoLabels(path.to_path_buf()));
    }
    LabelTable::new(labels)
}

/// Labels from the second column of a CSV file with a header row.
///
/// ```csv
/// id,name
/// 0,bicycle
/// 1,bus
/// ```
pub fn load_labels_from_csv(path: &Path) -> Result<Vec<String>, LabelError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| LabelError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut labels = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| LabelError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(name) = record.get(1) {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                labels.push(trimmed.to_string());
            }
        }
    }

    Ok(labels)
}

/// One label per line; blank lines are skipped.
pub fn load_labels_from_text(path: &Path) -> Result<Vec<String>, LabelError> {
    let content = fs::read_to_string(path).map_err(|source| LabelError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// A JSON array of strings or an object with a `labels` array.
pub fn load_labels_from_json(path: &Path) -> Result<Vec<String>, LabelError> {
    let content = fs::read_to_string(path).map_err(|source| LabelError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if let Ok(labels) = serde_json::from_str::<Vec<String>>(&content) {
        return Ok(labels);
    }

    #[derive(serde::Deserialize)]
    struct LabelsObject {
        labels: Vec<String>,
    }

    serde_json::from_str::<LabelsObject>(&content)
        .map(|obj| obj.labels)
        .map_err(|source| LabelError::Json {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("label table is empty")]
    Empty,
    #[error("label at index {0} is blank")]
    BlankLabel(usize),
    #[error("labels file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("no labels found in {}", .0.display())]
    NoLabels(PathBuf),
    #[error("failed to read labels {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid labels CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid labels JSON {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
