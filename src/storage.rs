// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Durable string key-value storage.

use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to encode the value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait Storage: Send {
    /// Returns the value stored under the key.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores a value under the key, replacing any previous value.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Keeps every key in a single JSON object file. The file is replaced on each set
/// by writing a sibling temporary file and renaming it over the original.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> FileStorage {
        FileStorage {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut all = match self.read_all() {
            Ok(all) => all,
            Err(e @ StorageError::Corrupt { .. }) => {
                warn!(err = %e, "Discarding corrupt storage file");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        all.insert(key.to_string(), value.to_string());
        // A map of strings always serializes.
        let contents = serde_json::to_string_pretty(&all).map_err(|source| {
            StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.tmp_path();
        fs::write(&tmp, contents)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = ?self.path, key, bytes = value.len(), "Stored value");
        Ok(())
    }
}

/// Keeps values in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_file_storage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let mut storage = FileStorage::new(&path);
        assert_eq!(storage.get("typiano.log").unwrap(), None);

        storage.set("typiano.log", r#"["1"," "]"#).unwrap();
        storage.set("other", "value").unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(
            reopened.get("typiano.log").unwrap().as_deref(),
            Some(r#"["1"," "]"#)
        );
        assert_eq!(reopened.get("other").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn test_file_storage_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(
            storage.get("typiano.log"),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_file_storage_recovers_from_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, r#"{"typiano.log": "[\"1\""#).unwrap();

        let mut storage = FileStorage::new(&path);
        storage.set("typiano.log", r#"["2"]"#).unwrap();
        storage.set("other", "value").unwrap();

        assert_eq!(
            storage.get("typiano.log").unwrap().as_deref(),
            Some(r#"["2"]"#)
        );
        assert_eq!(storage.get("other").unwrap().as_deref(), Some("value"));
        assert!(!dir.path().join("storage.json.tmp").exists());
    }

    #[test]
    fn test_memory_storage() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get("k").unwrap(), None);
        storage.set("k", "v").unwrap();
        storage.set("k", "w").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("w"));
    }
}
