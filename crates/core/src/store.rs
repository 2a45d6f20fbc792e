//! Persistence port for investigation records.
//!
//! Implementations: in-memory (for testing), JSON-lines file, none (no-op).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::investigation::InvestigationRecord;

/// Store/get/update of run records keyed by run id.
///
/// `store` fails with [`StoreError::Duplicate`] when the id already exists;
/// `get` and `update` fail with [`StoreError::NotFound`] when it does not.
#[async_trait]
pub trait InvestigationStore: Send + Sync {
    /// The backend name (e.g., "memory", "file", "none").
    fn name(&self) -> &str;

    /// Persist a new record.
    async fn store(&self, record: InvestigationRecord) -> Result<(), StoreError>;

    /// Fetch a record by run id.
    async fn get(&self, id: &str) -> Result<InvestigationRecord, StoreError>;

    /// Replace an existing record.
    async fn update(&self, record: InvestigationRecord) -> Result<(), StoreError>;

    /// All records for one alert, oldest first.
    async fn list_for_alert(&self, alert_id: &str) -> Result<Vec<InvestigationRecord>, StoreError>;
}
