//! Durable token storage: one JSON record per provider key.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{error::StorageError, types::TokenRecord};

/// Persists [`TokenRecord`]s under a base directory, one file per key.
///
/// Writes go through a temporary file and a rename, so a `save` that returns
/// `Ok` is visible to any later `load`, including after a process restart.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    /// Store rooted at `~/.tunedeck/tokens`.
    pub fn new() -> Result<Self, StorageError> {
        let home = directories::BaseDirs::new().ok_or(StorageError::NoHomeDir)?;
        Ok(Self {
            dir: home.home_dir().join(".tunedeck/tokens"),
        })
    }

    /// Store rooted at an explicit directory.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the record stored under `key`. A key that was never saved is
    /// `Ok(None)`, not an error.
    pub fn load(&self, key: &str) -> Result<Option<TokenRecord>, StorageError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path, err)),
        };
        let record = serde_json::from_slice(&bytes).map_err(|err| StorageError::Corrupt {
            path: path.display().to_string(),
            source: err,
        })?;
        Ok(Some(record))
    }

    /// Replace the record stored under `key` wholesale.
    pub fn save(&self, key: &str, record: &TokenRecord) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|err| io_error(&self.dir, err))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(record).map_err(|err| StorageError::Corrupt {
            path: path.display().to_string(),
            source: err,
        })?;
        fs::write(&tmp, json).map_err(|err| io_error(&tmp, err))?;
        fs::rename(&tmp, &path).map_err(|err| io_error(&path, err))?;
        Ok(())
    }

    /// Remove the record stored under `key`, if any.
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&path, err)),
        }
    }

    /// Keys with a stored record.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        keys.sort();
        keys
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}
