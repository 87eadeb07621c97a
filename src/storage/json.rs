use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// Directory-backed store of named JSON documents.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl JsonStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;
        debug!(root = %root.display(), "JSON store opened");
        Ok(Self { root })
    }

    /// Directory holding the documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a document.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether a document exists.
    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    /// Write a document, replacing any previous content.
    ///
    /// The document is written to a temporary sibling and renamed into place
    /// so readers never observe a half-written file.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> StorageResult<()> {
        let path = self.path_of(name);
        let tmp = self.root.join(format!(".{}.tmp", name));
        let body = serde_json::to_string_pretty(value)?;

        fs::write(&tmp, body).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;

        debug!(path = %path.display(), "Document saved");
        Ok(())
    }

    /// Read a document, failing with [`StorageError::NotFound`] if absent.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> StorageResult<T> {
        self.try_load(name)?.ok_or_else(|| StorageError::NotFound {
            key: name.to_string(),
        })
    }

    /// Read a document if it exists.
    pub fn try_load<T: DeserializeOwned>(&self, name: &str) -> StorageResult<Option<T>> {
        let path = self.path_of(name);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        Ok(Some(serde_json::from_str(&body)?))
    }

    /// Delete a document. Returns whether it existed.
    pub fn delete(&self, name: &str) -> StorageResult<bool> {
        let path = self.path_of(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Names of documents matching `prefix` and `suffix`, sorted.
    pub fn list(&self, prefix: &str, suffix: &str) -> StorageResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| io_error(&self.root, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, root = %self.root.display(), "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) && name.ends_with(suffix) && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
