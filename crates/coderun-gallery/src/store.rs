//! Snapshot persistence.
//!
//! A snapshot store is a flat string-to-string map, the moral equivalent of
//! browser local storage. Edited template text lives under `code<index>`.

use std::collections::{BTreeMap, HashMap};
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::StoreError;

/// Key under which the snapshot for template `index` is stored
pub fn snapshot_key(index: usize) -> String {
    format!("code{index}")
}

/// Key-value storage for edited snippets
pub trait SnapshotStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory store, lost when dropped
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file backed store.
///
/// The whole map is read on open and rewritten on every `set`. Writes go to a
/// temporary file in the same directory which then replaces the store file,
/// so a crash mid-write never leaves a truncated store behind.
#[derive(Debug)]
pub struct FileStore {
    path: Utf8PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs_err::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| {
                StoreError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path, entries = entries.len(), "opened snapshot store");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };
        fs_err::create_dir_all(dir)?;

        let json = serde_json::to_vec_pretty(&self.entries).map_err(StoreError::Encode)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl SnapshotStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()?;
        debug!(path = %self.path, key, bytes = value.len(), "snapshot written");
        Ok(())
    }
}
