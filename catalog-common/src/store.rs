use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const RECORD_EXTENSION: &str = ".json";

/// Enumeration of errors for operations with a `RawRecordStore`.
/// Filesystem errors are wrapped to keep the path that caused them.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no record stored under key {0}")]
    NotFound(String),
    #[error("{0:?} cannot be used as a store key")]
    InvalidKey(String),
    #[error("{operation} failed for {path:?} with: {error}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("record {key} is not valid JSON: {error}")]
    Json {
        key: String,
        error: serde_json::Error,
    },
}

impl StoreError {
    fn io(operation: &'static str, path: &Path, error: std::io::Error) -> Self {
        StoreError::Io {
            operation,
            path: path.to_owned(),
            error,
        }
    }
}

/// A directory of raw JSON documents, one `{key}.json` file per key.
///
/// Constructing a store performs no I/O: callers are expected to `reset` it once per run.
/// Writes land in a temporary file which is then renamed over the record, so concurrent
/// writers of the same key race on last-write-wins without ever leaving a torn file.
#[derive(Debug, Clone)]
pub struct RawRecordStore {
    root: PathBuf,
}

impl RawRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete everything under the store root and recreate it empty.
    pub async fn reset(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!("wiped record store at {:?}", self.root),
            Err(error) if error.kind() == ErrorKind::NotFound => (),
            Err(error) => return Err(StoreError::io("remove_dir_all", &self.root, error)),
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| StoreError::io("create_dir_all", &self.root, error))
    }

    /// Write `value` under `key`, replacing any previous document.
    pub async fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec(value).map_err(|error| StoreError::Json {
            key: key.to_owned(),
            error,
        })?;

        let staging = self.root.join(format!(".{}.tmp", Uuid::now_v7()));
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|error| StoreError::io("write", &staging, error))?;

        if let Err(error) = tokio::fs::rename(&staging, &path).await {
            // A leftover staging file is invisible to list_keys anyway.
            if let Err(cleanup_error) = tokio::fs::remove_file(&staging).await {
                debug!("failed to remove staging file {:?}: {}", staging, cleanup_error);
            }
            return Err(StoreError::io("rename", &path, error));
        }

        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Value, StoreError> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_owned()))
            }
            Err(error) => return Err(StoreError::io("read", &path, error)),
        };

        serde_json::from_slice(&bytes).map_err(|error| StoreError::Json {
            key: key.to_owned(),
            error,
        })
    }

    /// List every stored key, sorted.
    pub async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = vec![];
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|error| StoreError::io("read_dir", &self.root, error))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| StoreError::io("read_dir", &self.root, error))?
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }
            if let Some(key) = file_name.strip_suffix(RECORD_EXTENSION) {
                keys.push(key.to_owned());
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\', '\0']) {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }

        Ok(self.root.join(format!("{key}{RECORD_EXTENSION}")))
    }
}
