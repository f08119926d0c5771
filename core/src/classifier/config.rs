//! Configuration for the gallery classifier.
//!
//! Loaded from a TOML file so the bundled model, its input contract and the
//! storage locations can change without recompiling.

use crate::import::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::runtime::{IMAGE_NET_MEAN, IMAGE_NET_STD};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "trafficmode.toml";

/// Default name of the bundled model asset.
pub const DEFAULT_MODEL_ASSET: &str = "model.onnx";

/// Memory layout of the input tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TensorLayout {
    /// `[1, 3, H, W]`, PyTorch style.
    #[default]
    Nchw,
    /// `[1, H, W, 3]`.
    Nhwc,
}

/// Input contract of the bundled model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInputSpec {
    /// Input image width in pixels
    #[serde(default = "default_side")]
    pub width: u32,
    /// Input image height in pixels
    #[serde(default = "default_side")]
    pub height: u32,
    /// Per-channel mean (RGB order)
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    /// Per-channel standard deviation (RGB order)
    #[serde(default = "default_std")]
    pub std: [f32; 3],
    /// Input tensor layout
    #[serde(default)]
    pub layout: TensorLayout,
}

fn default_side() -> u32 {
    400
}

fn default_mean() -> [f32; 3] {
    IMAGE_NET_MEAN
}

fn default_std() -> [f32; 3] {
    IMAGE_NET_STD
}

impl Default for ModelInputSpec {
    fn default() -> Self {
        Self {
            width: default_side(),
            height: default_side(),
            mean: default_mean(),
            std: default_std(),
            layout: TensorLayout::default(),
        }
    }
}

/// The bundled model and its label table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Asset name of the model inside the bundle directory
    #[serde(default = "default_asset")]
    pub asset: String,
    /// Class labels, index-aligned with the model output
    #[serde(default)]
    pub labels: Vec<String>,
    /// Labels file (relative to the bundle directory or absolute)
    #[serde(default)]
    pub labels_file: Option<PathBuf>,
    /// Input specification
    #[serde(default)]
    pub input: ModelInputSpec,
}

fn default_asset() -> String {
    DEFAULT_MODEL_ASSET.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            asset: default_asset(),
            labels: Vec::new(),
            labels_file: None,
            input: ModelInputSpec::default(),
        }
    }
}

/// Root configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Directory holding the packaged, read-only assets
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,

    /// Private writable directory for materialized assets and imports
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Retention of imported image copies
    #[serde(default)]
    pub retention: RetentionPolicy,

    #[serde(default)]
    pub model: ModelConfig,
}

fn default_bundle_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("trafficmode"))
        .unwrap_or_else(|| PathBuf::from(".trafficmode"))
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            bundle_dir: default_bundle_dir(),
            data_dir: default_data_dir(),
            retention: RetentionPolicy::default(),
            model: ModelConfig::default(),
        }
    }
}

impl ClassifierConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Load configuration from `./trafficmode.toml`, then from the data
    /// directory, falling back to defaults when neither file exists.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Self::load_first([
            PathBuf::from(DEFAULT_CONFIG_FILE),
            default_data_dir().join(DEFAULT_CONFIG_FILE),
        ])
    }

    /// Load the first candidate file that exists. Missing files are skipped;
    /// any other error is returned.
    pub fn load_first<I>(candidates: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        for path in candidates {
            match Self::load(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config");
                    return Ok(config);
                }
                Err(ConfigError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error),
            }
        }
        Ok(Self::default())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Render the configuration as pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Directory holding materialized assets.
    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    /// Directory holding imported image copies.
    pub fn imports_dir(&self) -> PathBuf {
        self.data_dir.join("imports")
    }

    /// Full path of the labels file, if one is configured.
    pub fn labels_path(&self) -> Option<PathBuf> {
        self.model.labels_file.as_ref().map(|file| {
            if file.is_absolute() {
                file.clone()
            } else {
                self.bundle_dir.join(file)
            }
        })
    }

    /// Check the parts of the configuration that can be checked without
    /// touching the model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let input = &self.model.input;
        if input.width == 0 || input.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "input size must be nonzero, got {}x{}",
                input.width, input.height
            )));
        }
        if input.std.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(ConfigError::Invalid(format!(
                "input std must be finite and nonzero, got {:?}",
                input.std
            )));
        }
        if self.model.asset.trim().is_empty() {
            return Err(ConfigError::Invalid("model asset name is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config {}: {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid config TOML in {}: {source}", path.display())]
    Parse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
