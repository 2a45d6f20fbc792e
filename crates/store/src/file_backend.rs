//! File-based store: persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `InvestigationRecord`. Records are loaded into
//! memory on creation and the whole file is rewritten on every mutation.
//!
//! Storage location: `~/.vigil/investigations.jsonl`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use vigil_core::error::StoreError;
use vigil_core::investigation::InvestigationRecord;
use vigil_core::store::InvestigationStore;

/// A file-backed store using JSONL (one record per line).
pub struct FileStore {
    path: PathBuf,
    records: Arc<RwLock<Vec<InvestigationRecord>>>,
}

impl FileStore {
    /// Open a store at `path`. A missing file starts empty and is created on
    /// first write.
    pub fn new(path: PathBuf) -> Self {
        let records = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = records.len(), "File store loaded");
        Self {
            path,
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Default path: `~/.vigil/investigations.jsonl`
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".vigil")
            .join("investigations.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<InvestigationRecord> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<InvestigationRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted investigation record");
                    None
                }
            })
            .collect()
    }

    fn flush(&self, records: &[InvestigationRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create store directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|e| {
                StoreError::Storage(format!("Failed to serialize investigation record: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| StoreError::Storage(format!("Failed to write store file: {e}")))
    }
}

#[async_trait]
impl InvestigationStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn store(&self, record: InvestigationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.push(record);
        if let Err(e) = self.flush(&records) {
            records.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<InvestigationRecord, StoreError> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, record: InvestigationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let index = records
            .iter()
            .position(|r| r.id == record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;
        let previous = std::mem::replace(&mut records[index], record);
        if let Err(e) = self.flush(&records) {
            records[index] = previous;
            return Err(e);
        }
        Ok(())
    }

    async fn list_for_alert(&self, alert_id: &str) -> Result<Vec<InvestigationRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.alert_id == alert_id)
            .cloned()
            .collect())
    }
}
