//! SQLite storage for the cloud sync outbox and the store adapter used by the engine.

pub mod store;
pub mod sync_queue;

// Re-export for convenience
pub use store::SqliteSyncStore;
pub use sync_queue::{write_sync_queue_item, SyncQueueRepository, SyncQueueWriteRequest};
