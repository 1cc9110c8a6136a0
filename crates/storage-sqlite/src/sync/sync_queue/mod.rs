//! SQLite persistence for the cloud sync outbox.

mod model;
mod repository;

pub use model::{NewSyncQueueItemDB, SyncQueueItemDB};
pub use repository::{write_sync_queue_item, SyncQueueRepository, SyncQueueWriteRequest};
