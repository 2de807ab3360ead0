//! Flat-file record store.
//!
//! The whole sequence lives in one JSON array and every mutation rewrites the
//! file. Writers are serialized through one async mutex; readers never block.

mod error;

pub use error::StoreError;

use crate::models::Record;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

pub struct ContentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ContentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in insertion order. A missing or unparsable file reads as
    /// an empty store.
    pub async fn load(&self) -> Vec<Record> {
        match self.read_records().await {
            Ok(records) => records,
            Err(StoreError::FileNotFound) => Vec::new(),
            Err(e) => {
                log::warn!(
                    "Treating content file {} as empty: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    pub async fn count(&self) -> usize {
        self.load().await.len()
    }

    /// Appends a record. Both fields must be non-empty. A missing or
    /// unparsable file starts a fresh array; a file that cannot be read at all
    /// is an error and is left as it is.
    pub async fn append(&self, record: Record) -> Result<(), StoreError> {
        if record.title.is_empty() || record.content.is_empty() {
            return Err(StoreError::Validation(
                "Title and content are required.".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut records = match self.read_records().await {
            Ok(records) => records,
            Err(StoreError::FileNotFound) => Vec::new(),
            Err(StoreError::Serialization(e)) => {
                log::warn!(
                    "Overwriting unparsable content file {}: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        records.push(record);
        self.write_records(&records).await?;
        log::debug!("Appended record #{} to {}", records.len() - 1, self.path.display());
        Ok(())
    }

    /// Removes the record at `index`, shifting every later record down by
    /// one. The file is left untouched when the index is out of range.
    pub async fn delete_at(&self, index: usize) -> Result<Record, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = match self.read_records().await {
            Ok(records) => records,
            Err(StoreError::Io(e)) => return Err(StoreError::Io(e)),
            Err(e) => {
                log::debug!("Delete on unreadable store {}: {}", self.path.display(), e);
                return Err(StoreError::FileNotFound);
            }
        };

        if index >= records.len() {
            return Err(StoreError::RecordNotFound {
                index,
                len: records.len(),
            });
        }

        let removed = records.remove(index);
        self.write_records(&records).await?;
        Ok(removed)
    }

    async fn read_records(&self) -> Result<Vec<Record>, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::FileNotFound);
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Rewrites the whole file via a sibling temp file and a rename, so a
    /// reader sees either the old array or the new one.
    async fn write_records(&self, records: &[Record]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, json.as_bytes()).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "content.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
