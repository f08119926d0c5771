//! Materializes bundled, read-only assets (the model file, label tables)
//! into private writable storage so they can be loaded by path.

use crate::copy::{copy_chunked, ASSET_CHUNK_SIZE};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// A read-only collection of named resources packaged with the application.
pub trait AssetSource {
    /// Opens a read stream over the named resource.
    fn open(&self, name: &str) -> io::Result<Box<dyn Read>>;
}

/// Assets shipped as plain files in a bundle directory.
#[derive(Clone, Debug)]
pub struct BundleDir {
    root: PathBuf,
}

impl BundleDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for BundleDir {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read>> {
        let file = File::open(self.root.join(name))?;
        Ok(Box::new(file))
    }
}

/// Assets held in memory, e.g. embedded with `include_bytes!`.
#[derive(Clone, Debug, Default)]
pub struct EmbeddedAssets {
    entries: HashMap<String, Vec<u8>>,
}

impl EmbeddedAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), bytes.into());
    }
}

impl AssetSource for EmbeddedAssets {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read>> {
        match self.entries.get(name) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no embedded asset named {}", name),
            )),
        }
    }
}

/// Private copy of the bundled assets.
///
/// A file that already exists with a nonzero length is reused as-is. There
/// is no checksum or version check, so replacing a bundled asset requires
/// removing the private copy.
pub struct AssetStore {
    source: Box<dyn AssetSource>,
    root: PathBuf,
}

impl AssetStore {
    pub fn new(source: impl AssetSource + 'static, root: impl Into<PathBuf>) -> Self {
        Self {
            source: Box::new(source),
            root: root.into(),
        }
    }

    /// Returns the private path of `name`, copying it out of the bundle on
    /// first use.
    pub fn ensure_local(&self, name: &str) -> Result<PathBuf, AssetError> {
        validate_name(name)?;
        let target = self.root.join(name);

        if let Ok(metadata) = fs::metadata(&target) {
            if metadata.is_file() && metadata.len() > 0 {
                debug!(asset = name, path = %target.display(), "reusing materialized asset");
                return Ok(target);
            }
        }

        fs::create_dir_all(&self.root).map_err(|source| AssetError::Io {
            source,
            path: self.root.clone(),
        })?;

        let mut reader = self.source.open(name).map_err(|source| AssetError::Open {
            name: name.to_string(),
            source,
        })?;

        let copied = write_asset(&mut reader, &target).map_err(|source| {
            let _ = fs::remove_file(&target);
            AssetError::Io {
                source,
                path: target.clone(),
            }
        })?;

        info!(asset = name, bytes = copied, path = %target.display(), "materialized asset");
        Ok(target)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn write_asset(reader: &mut dyn Read, target: &Path) -> io::Result<u64> {
    let file = File::create(target)?;
    let mut writer = BufWriter::new(file);
    copy_chunked(reader, &mut writer, ASSET_CHUNK_SIZE)
}

fn validate_name(name: &str) -> Result<(), AssetError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(AssetError::InvalidName(name.to_string())),
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset name: {0}")]
    InvalidName(String),
    #[error("failed to open bundled asset {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("io error for {}: {source}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}
