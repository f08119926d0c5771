use crate::classifier::Prediction;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const REPORT_VERSION: u32 = 1;

/// Outcome for one input image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// The image as the user referred to it
    pub source: String,
    /// Ranked predictions, best first; empty when classification failed
    pub predictions: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationRecord {
    pub fn success(source: impl Into<String>, predictions: Vec<Prediction>) -> Self {
        Self {
            source: source.into(),
            predictions,
            error: None,
        }
    }

    pub fn failure(source: impl Into<String>, error: impl ToString) -> Self {
        Self {
            source: source.into(),
            predictions: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn best(&self) -> Option<&Prediction> {
        self.predictions.first()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub version: u32,
    pub generated_at: String,
    pub model: String,
    pub records: Vec<ClassificationRecord>,
}

impl ClassificationReport {
    pub fn new(model: impl Into<String>, records: Vec<ClassificationRecord>) -> Self {
        Self {
            version: REPORT_VERSION,
            generated_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| String::from("unknown")),
            model: model.into(),
            records,
        }
    }
}

pub fn write_report<P: AsRef<Path>>(
    report: &ClassificationReport,
    path: P,
) -> Result<(), ReportingError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ReportingError::Io {
            source,
            path: parent.to_path_buf(),
        })?;
    }
    let file = File::create(path).map_err(|source| ReportingError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).map_err(ReportingError::Serialization)?;
    writer.flush().map_err(|source| ReportingError::Io {
        source,
        path: path.to_path_buf(),
    })
}

pub fn read_report<P: AsRef<Path>>(path: P) -> Result<ClassificationReport, ReportingError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ReportingError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(ReportingError::Serialization)
}

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("io error for {}: {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}
