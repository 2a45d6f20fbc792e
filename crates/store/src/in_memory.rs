//! In-memory store, useful for testing and single-process deployments.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use vigil_core::error::StoreError;
use vigil_core::investigation::InvestigationRecord;
use vigil_core::store::InvestigationStore;

/// Records kept in insertion order.
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<InvestigationRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvestigationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn store(&self, record: InvestigationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.push(record);
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
        let slot = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;
        *slot = record;
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

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::investigation::InvestigationStatus;

    #[tokio::test]
    async fn store_and_get() {
        let store = InMemoryStore::new();
        store
            .store(InvestigationRecord::started("inv-1", "a1"))
            .await
            .unwrap();

        let record = store.get("inv-1").await.unwrap();
        assert_eq!(record.alert_id, "a1");
        assert_eq!(record.status, InvestigationStatus::Started);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let store = InMemoryStore::new();
        store
            .store(InvestigationRecord::started("inv-1", "a1"))
            .await
            .unwrap();
        let err = store
            .store(InvestigationRecord::started("inv-1", "a2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == "inv-1"));
    }

    #[tokio::test]
    async fn missing_id_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.update(InvestigationRecord::started("nope", "a1")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_replaces_record() {
        let store = InMemoryStore::new();
        let mut record = InvestigationRecord::started("inv-1", "a1");
        store.store(record.clone()).await.unwrap();

        record.mark_stopped();
        store.update(record).await.unwrap();
        assert_eq!(
            store.get("inv-1").await.unwrap().status,
            InvestigationStatus::Stopped
        );
    }

    #[tokio::test]
    async fn list_for_alert_keeps_insertion_order() {
        let store = InMemoryStore::new();
        for (id, alert) in [("inv-1", "a1"), ("inv-2", "a2"), ("inv-3", "a1")] {
            store
                .store(InvestigationRecord::started(id, alert))
                .await
                .unwrap();
        }
        let ids: Vec<String> = store
            .list_for_alert("a1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["inv-1", "inv-3"]);
    }
}
