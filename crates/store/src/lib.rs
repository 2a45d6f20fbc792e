//! Investigation record stores for Vigil.

pub mod file_backend;
pub mod in_memory;
pub mod noop;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use noop::NoopStore;

use std::sync::Arc;

use vigil_config::StoreConfig;
use vigil_core::store::InvestigationStore;

/// Build the store selected by `[store] backend`.
///
/// The "file" backend uses `[store] path`, or `FileStore::default_path()`.
pub fn open_store(config: &StoreConfig) -> Arc<dyn InvestigationStore> {
    match config.backend.as_str() {
        "file" => {
            let path = config.path.clone().unwrap_or_else(FileStore::default_path);
            Arc::new(FileStore::new(path))
        }
        "none" => Arc::new(NoopStore),
        _ => Arc::new(InMemoryStore::new()),
    }
}
