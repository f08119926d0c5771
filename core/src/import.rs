//! Imports user-picked images into private storage.
//!
//! Every import produces a new file named after the current Unix time in
//! milliseconds. The [`RetentionPolicy`] decides whether earlier copies are
//! kept around.

use crate::copy::{copy_chunked, IMPORT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

/// Opaque reference to a picked image: a plain path or a `file://` URI.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local filesystem path behind the handle. `file://` URIs are
    /// percent-decoded.
    pub fn to_local_path(&self) -> io::Result<PathBuf> {
        if self.0.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty resource handle"));
        }
        if !self.0.starts_with("file:") {
            return Ok(PathBuf::from(&self.0));
        }
        let uri = Url::parse(&self.0)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        uri.to_file_path().map_err(|()| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a local file URI", self.0),
            )
        })
    }

    /// Lowercased extension of the referenced resource, if it has one.
    fn extension(&self) -> Option<String> {
        self.to_local_path()
            .ok()?
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| ext.to_ascii_lowercase())
    }
}

impl From<&Path> for ResourceHandle {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for ResourceHandle {
    fn from(path: PathBuf) -> Self {
        Self::from(path.as_path())
    }
}

impl Display for ResourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a [`ResourceHandle`] into a byte stream.
pub trait ResourceResolver {
    fn open(&self, handle: &ResourceHandle) -> io::Result<Box<dyn Read>>;
}

/// Resolves handles that point at the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileResolver;

impl ResourceResolver for FileResolver {
    fn open(&self, handle: &ResourceHandle) -> io::Result<Box<dyn Read>> {
        let path = handle.to_local_path()?;
        Ok(Box::new(File::open(path)?))
    }
}

/// What happens to earlier imports once a new one succeeds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionPolicy {
    /// Delete the previous copy after a successful import.
    #[default]
    KeepLatest,
    /// Never delete imported copies.
    KeepAll,
}

/// Copies picked images into a private directory.
pub struct ImageImporter {
    resolver: Box<dyn ResourceResolver>,
    root: PathBuf,
    retention: RetentionPolicy,
    current: Option<PathBuf>,
}

impl ImageImporter {
    pub fn new(resolver: impl ResourceResolver + 'static, root: impl Into<PathBuf>) -> Self {
        Self {
            resolver: Box::new(resolver),
            root: root.into(),
            retention: RetentionPolicy::default(),
            current: None,
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Copies the resource behind `handle` into private storage and returns
    /// the absolute path of the copy.
    pub fn import_and_copy(&mut self, handle: &ResourceHandle) -> Result<PathBuf, ImportError> {
        let mut reader = self
            .resolver
            .open(handle)
            .map_err(|source| ImportError::Resolve {
                handle: handle.to_string(),
                source,
            })?;

        fs::create_dir_all(&self.root).map_err(|source| ImportError::Io {
            source,
            path: self.root.clone(),
        })?;
        let root = fs::canonicalize(&self.root).map_err(|source| ImportError::Io {
            source,
            path: self.root.clone(),
        })?;

        let (target, file) = create_unique(&root, handle.extension().as_deref())?;
        let mut writer = BufWriter::new(file);
        let copied = copy_chunked(&mut reader, &mut writer, IMPORT_CHUNK_SIZE);
        drop(writer);

        let copied = match copied {
            Ok(copied) => copied,
            Err(source) => {
                let _ = fs::remove_file(&target);
                return Err(ImportError::Io {
                    source,
                    path: target,
                });
            }
        };

        info!(%handle, bytes = copied, path = %target.display(), "imported image");

        if let Some(previous) = self.current.replace(target.clone()) {
            if self.retention == RetentionPolicy::KeepLatest {
                remove_quietly(&previous);
            }
        }

        Ok(target)
    }

    /// Most recent successful import, if any.
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Forgets the current import, deleting it under
    /// [`RetentionPolicy::KeepLatest`].
    pub fn release_current(&mut self) {
        if let Some(previous) = self.current.take() {
            if self.retention == RetentionPolicy::KeepLatest {
                remove_quietly(&previous);
            }
        }
    }

    /// Removes every imported copy except the current one. Returns the
    /// number of files deleted.
    pub fn prune(&self) -> Result<usize, ImportError> {
        if !self.root.exists() {
            return Ok(0);
        }
        let current = self
            .current
            .as_ref()
            .and_then(|path| fs::canonicalize(path).ok());

        let mut removed = 0;
        for entry in fs::read_dir(&self.root).map_err(|source| ImportError::Io {
            source,
            path: self.root.clone(),
        })? {
            let path = entry
                .map_err(|source| ImportError::Io {
                    source,
                    path: self.root.clone(),
                })?
                .path();
            if !path.is_file() {
                continue;
            }
            if current.is_some() && fs::canonicalize(&path).ok() == current {
                continue;
            }
            fs::remove_file(&path).map_err(|source| ImportError::Io {
                source,
                path: path.clone(),
            })?;
            removed += 1;
        }
        debug!(removed, root = %self.root.display(), "pruned imported images");
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }
}

fn create_unique(root: &Path, extension: Option<&str>) -> Result<(PathBuf, File), ImportError> {
    let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut attempt = 0u32;
    loop {
        let stem = if attempt == 0 {
            stamp.to_string()
        } else {
            format!("{}-{}", stamp, attempt)
        };
        let name = match extension {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        };
        let candidate = root.join(name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(source) => {
                return Err(ImportError::Io {
                    source,
                    path: candidate,
                })
            }
        }
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed previous import"),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => warn!(path = %path.display(), %error, "failed to remove previous import"),
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot open picked image {handle}: {source}")]
    Resolve {
        handle: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy image to {}: {source}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}
