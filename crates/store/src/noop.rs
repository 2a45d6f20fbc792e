//! No-op store: disables persistence entirely.

use async_trait::async_trait;
use vigil_core::error::StoreError;
use vigil_core::investigation::InvestigationRecord;
use vigil_core::store::InvestigationStore;

/// Accepts every write and remembers nothing.
pub struct NoopStore;

#[async_trait]
impl InvestigationStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn store(&self, _record: InvestigationRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<InvestigationRecord, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, _record: InvestigationRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_for_alert(
        &self,
        _alert_id: &str,
    ) -> Result<Vec<InvestigationRecord>, StoreError> {
        Ok(Vec::new())
    }
}
