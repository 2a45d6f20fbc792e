//! Best-effort writes of investigation records. Failures are logged, never
//! returned: persistence must not change a run's outcome.

use tracing::{debug, warn};
use vigil_core::error::StoreError;
use vigil_core::investigation::{InvestigationRecord, InvestigationResult};
use vigil_core::store::InvestigationStore;

/// Record a freshly registered run.
pub(crate) async fn record_started(store: &dyn InvestigationStore, run_id: &str, alert_id: &str) {
    let record = InvestigationRecord::started(run_id, alert_id);
    match store.store(record).await {
        Ok(()) => debug!(run_id, backend = store.name(), "Stored started record"),
        Err(e) => warn!(run_id, error = %e, "Failed to store started record"),
    }
}

/// Fold a terminal result into the run's record, creating it if missing.
pub(crate) async fn record_result(
    store: &dyn InvestigationStore,
    result: &InvestigationResult,
    session_id: Option<&str>,
) {
    let id = result.investigation_id.as_str();
    let outcome = match store.get(id).await {
        Ok(mut record) => {
            record.apply_result(result, session_id);
            store.update(record).await
        }
        Err(StoreError::NotFound(_)) => {
            let mut record = InvestigationRecord::started(id, &result.alert_id);
            record.apply_result(result, session_id);
            store.store(record).await
        }
        Err(e) => Err(e),
    };
    if let Err(e) = outcome {
        warn!(run_id = id, error = %e, "Failed to persist investigation result");
    }
}

/// Mark a run as stopped, creating the record if missing.
pub(crate) async fn record_stopped(store: &dyn InvestigationStore, run_id: &str, alert_id: &str) {
    let outcome = match store.get(run_id).await {
        Ok(mut record) => {
            record.mark_stopped();
            store.update(record).await
        }
        Err(StoreError::NotFound(_)) => {
            let mut record = InvestigationRecord::started(run_id, alert_id);
            record.mark_stopped();
            store.store(record).await
        }
        Err(e) => Err(e),
    };
    if let Err(e) = outcome {
        warn!(run_id, error = %e, "Failed to persist stopped record");
    }
}
