//! Local storage for session tokens and the cart.
//!
//! A small JSON key/value file (`storage.json`) in the data directory plays
//! the role a browser's local storage plays for a web storefront. Every write
//! is flushed immediately through a temp file and rename so a crash never
//! leaves a half-written file behind. A write only takes effect in memory
//! once it is on disk, so a failed write leaves the previous value readable.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// File name used inside the data directory.
pub const STORAGE_FILE: &str = "storage.json";

/// Fixed storage keys.
pub mod keys {
    /// The logged-in user's profile.
    pub const USER: &str = "user";

    /// Bearer access token.
    pub const TOKEN: &str = "token";

    /// Refresh token used to renew the access token.
    pub const REFRESH_TOKEN: &str = "refresh_token";

    /// The shopping cart.
    pub const CART: &str = "cart";

    /// Keys cleared when the session ends.
    pub const SESSION: [&str; 3] = [USER, TOKEN, REFRESH_TOKEN];
}

/// Errors raised by [`LocalStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the storage file failed.
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The storage file exists but is not a JSON object.
    #[error("storage file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value does not have the expected shape.
    #[error("stored value for '{key}' is invalid: {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The entries could not be encoded for writing.
    #[error("failed to encode storage file {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-process lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Persistent key/value store of JSON values.
///
/// Cheaply cloneable; clones share the same entries and file.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<LocalStoreInner>,
}

struct LocalStoreInner {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl LocalStore {
    /// Open (or create) the store in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the file cannot
    /// be read, or its contents are not a JSON object.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir).map_err(|source| StorageError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let path = data_dir.join(STORAGE_FILE);
        let entries = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Local storage opened");

        Ok(Self {
            inner: Arc::new(LocalStoreInner {
                path: Some(path),
                entries: Mutex::new(entries),
            }),
        })
    }

    /// A store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(LocalStoreInner {
                path: None,
                entries: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Read and decode a value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidValue` if the stored JSON does not decode
    /// as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let entries = self.lock()?;
        entries
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| StorageError::InvalidValue {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Whether a key is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.contains_key(key))
    }

    /// Store a value and flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the file cannot be
    /// written.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|source| StorageError::InvalidValue {
            key: key.to_string(),
            source,
        })?;
        self.update(|entries| {
            entries.insert(key.to_string(), value);
            true
        })
    }

    /// Remove a key and flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_all(&[key])
    }

    /// Remove several keys with a single flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.update(|entries| {
            let mut changed = false;
            for key in keys {
                changed |= entries.remove(*key).is_some();
            }
            changed
        })
    }

    /// Apply `change` to a copy of the entries, flush the copy, then swap it
    /// in. `change` returns whether anything changed.
    fn update(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, Value>) -> bool,
    ) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        let mut next = entries.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Value>>, StorageError> {
        self.inner.entries.lock().map_err(|_| StorageError::Poisoned)
    }

    fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        let Some(path) = &self.inner.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| StorageError::Encode {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}
