//! # Session History Storage
//!
//! Persistence for finalized practice records. Each module owns one named
//! JSON file holding its ordered record list; the file is read once at
//! startup and rewritten in full on every append. There is no schema
//! migration logic - a file that fails to parse is an error, not silently
//! reset.
//!
//! The store is injected where it is used rather than reached through a
//! process-wide singleton, so tests can point it at a scratch directory.

use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::info;

/// Repository interface for one module's session history.
pub trait Repository<T>: Send + Sync {
    /// All records, oldest first.
    fn load(&self) -> AppResult<Vec<T>>;

    /// Append one finalized record and persist the full list.
    fn append(&self, record: T) -> AppResult<()>;
}

/// JSON-file-backed history store.
///
/// ## Concurrency:
/// The in-memory list is the source of truth after startup; a write lock
/// covers both the list mutation and the file rewrite so concurrent appends
/// can't interleave partial files.
pub struct JsonStore<T> {
    path: PathBuf,
    records: RwLock<Vec<T>>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Open (or create) the named store under `data_dir`.
    ///
    /// A missing file means an empty history; a present but unparsable file
    /// is a hard error.
    pub fn open(data_dir: &str, name: &str) -> AppResult<Self> {
        let dir = PathBuf::from(data_dir);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", name));

        let records = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|e| {
                AppError::Internal(format!(
                    "History file {} is corrupt: {}",
                    path.display(),
                    e
                ))
            })?
        } else {
            Vec::new()
        };

        info!(store = %path.display(), "History store opened");

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }
}

impl<T> Repository<T> for JsonStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn load(&self) -> AppResult<Vec<T>> {
        Ok(self.records.read().unwrap().clone())
    }

    fn append(&self, record: T) -> AppResult<()> {
        let mut records = self.records.write().unwrap();
        records.push(record);
        let serialized = serde_json::to_string_pretty(&*records)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: u32,
        topic: String,
    }

    fn scratch_dir() -> String {
        let dir = std::env::temp_dir().join(format!("ielts-store-{}", Uuid::new_v4()));
        dir.to_string_lossy().to_string()
    }

    #[test]
    fn test_missing_file_means_empty_history() {
        let store: JsonStore<Record> = JsonStore::open(&scratch_dir(), "essays").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_append_persists_and_reloads() {
        let dir = scratch_dir();
        {
            let store: JsonStore<Record> = JsonStore::open(&dir, "essays").unwrap();
            store
                .append(Record { id: 1, topic: "Handwriting".to_string() })
                .unwrap();
            store
                .append(Record { id: 2, topic: "Cities".to_string() })
                .unwrap();
        }

        // A fresh store reads the rewritten file
        let store: JsonStore<Record> = JsonStore::open(&dir, "essays").unwrap();
        let records = store.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].topic, "Cities");
    }

    #[test]
    fn test_stores_are_isolated_by_name() {
        let dir = scratch_dir();
        let essays: JsonStore<Record> = JsonStore::open(&dir, "essays").unwrap();
        let sessions: JsonStore<Record> = JsonStore::open(&dir, "sessions").unwrap();

        essays.append(Record { id: 1, topic: "t".to_string() }).unwrap();
        assert!(sessions.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = scratch_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(PathBuf::from(&dir).join("essays.json"), "{broken").unwrap();

        let result: AppResult<JsonStore<Record>> = JsonStore::open(&dir, "essays");
        assert!(result.is_err());
    }
}
