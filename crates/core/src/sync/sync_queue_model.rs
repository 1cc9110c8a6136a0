//! Outbox domain models and the local store contract consumed by the sync engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Canonical list of local business tables whose mutations are queued for cloud sync.
pub const POS_SYNC_TABLES: [&str; 7] = [
    "menu_categories",
    "menu_items",
    "orders",
    "order_items",
    "inventory_items",
    "customers",
    "restaurant_tables",
];

/// Supported mutation kinds recorded in the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        }
    }
}

/// Outbox row lifecycle.
///
/// `Pending` rows are drained by every pass. `Completed` and `Failed` are
/// terminal for the engine; a failed row needs operator intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncQueueStatus {
    Pending,
    Completed,
    Failed,
}

impl SyncQueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncQueueStatus::Pending => "pending",
            SyncQueueStatus::Completed => "completed",
            SyncQueueStatus::Failed => "failed",
        }
    }
}

/// A pending local mutation awaiting remote reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Local identifier assigned by the store.
    pub id: i64,
    pub table_name: String,
    pub operation: SyncOperation,
    pub record_id: String,
    /// Serialized snapshot of the record at mutation time.
    pub payload: String,
    pub created_at: String,
    pub status: SyncQueueStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
}

/// Local store contract used by the cloud sync engine.
///
/// The engine only ever changes `status`, `retry_count` and `last_error` of a
/// queue row. Implementations own atomicity of any multi-row update.
#[async_trait]
pub trait SyncQueueStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// All rows with `status = pending`, ordered by `created_at` ascending.
    async fn get_pending_sync_items(&self) -> Result<Vec<SyncQueueItem>>;

    async fn count_pending_sync_items(&self) -> Result<i64> {
        Ok(self.get_pending_sync_items().await?.len() as i64)
    }

    /// Moves a pending row to `status`. Rows that already left `pending` are untouched.
    async fn update_sync_item_status(
        &self,
        local_id: i64,
        status: SyncQueueStatus,
        error: Option<String>,
    ) -> Result<()>;

    async fn increment_sync_retry(&self, local_id: i64) -> Result<()>;

    /// Stamps the synced-at marker on the business record `(table_name, record_id)`.
    async fn mark_record_synced(
        &self,
        table_name: &str,
        record_id: &str,
        synced_at: &str,
    ) -> Result<()>;
}
