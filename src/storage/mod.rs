use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is not a valid id list: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single durable slot holding the serialized selection. The controller
/// reads it once at startup and overwrites it on every mutation.
pub trait StateSlot {
    fn load(&self) -> Result<Vec<u64>, StorageError>;
    fn save(&self, ids: &[u64]) -> Result<(), StorageError>;
}

/// File-backed slot: one JSON array of user ids.
#[derive(Clone, Debug)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateSlot for FileSlot {
    fn load(&self) -> Result<Vec<u64>, StorageError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Read {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|e| StorageError::Parse {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    fn save(&self, ids: &[u64]) -> Result<(), StorageError> {
        let write_err = |e: std::io::Error| StorageError::Write {
            path: self.path.display().to_string(),
            source: e,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        let contents = serde_json::to_vec(ids).map_err(|e| StorageError::Parse {
            path: self.path.display().to_string(),
            source: e,
        })?;
        // Write to a sibling temp file and rename so a crash mid-write never
        // leaves a torn slot behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &contents).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}
