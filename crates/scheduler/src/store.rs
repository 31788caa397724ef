//! Durable expression records.
//!
//! Only the record (id, text, owner, status, result) is persisted; the tree's
//! intermediate contraction state never is. On restart unfinished expressions
//! are parsed again and scheduled from scratch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tally_core::ExpressionId;
use thiserror::Error;
use tracing::{debug, warn};

use crate::expression::ExpressionView;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Persistence collaborator for expression records.
pub trait ExpressionStore: Send + Sync {
    /// Insert or overwrite the record with this id.
    fn save(&self, record: &ExpressionView) -> Result<(), StoreError>;

    /// Remove a record. Removing a missing record is not an error.
    fn remove(&self, id: ExpressionId) -> Result<(), StoreError>;

    /// Every stored record, ordered by id.
    fn load_all(&self) -> Result<Vec<ExpressionView>, StoreError>;
}

/// In-process store, used when nothing has to survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<ExpressionId, ExpressionView>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<ExpressionId, ExpressionView>>, StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("memory store: {}", e)))
    }
}

impl ExpressionStore for MemoryStore {
    fn save(&self, record: &ExpressionView) -> Result<(), StoreError> {
        self.records()?.insert(record.id, record.clone());
        Ok(())
    }

    fn remove(&self, id: ExpressionId) -> Result<(), StoreError> {
        self.records()?.remove(&id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<ExpressionView>, StoreError> {
        Ok(self.records()?.values().cloned().collect())
    }
}

/// Filesystem-backed store, one JSON document per expression:
/// ```text
/// <data_dir>/
///   expressions/
///     1.json
///     2.json
/// ```
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open the store under `data_dir`, creating `expressions/` if needed.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = data_dir.into().join("expressions");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: ExpressionId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl ExpressionStore for JsonFileStore {
    fn save(&self, record: &ExpressionView) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(self.path_for(record.id), json)?;
        debug!(expression_id = %record.id, status = %record.status, "record saved");
        Ok(())
    }

    fn remove(&self, id: ExpressionId) -> Result<(), StoreError> {
        let path = self.path_for(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<ExpressionView>, StoreError> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<ExpressionView>(&json) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}
