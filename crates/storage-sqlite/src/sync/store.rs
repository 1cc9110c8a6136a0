//! `SyncQueueStore` implementation backed by the SQLite repositories.

use async_trait::async_trait;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use bistro_core::sync::{SyncQueueItem, SyncQueueStatus, SyncQueueStore};
use bistro_core::Result;

use super::sync_queue::SyncQueueRepository;
use crate::db::WriteHandle;
use crate::settings::SettingsRepository;

pub struct SqliteSyncStore {
    settings: Arc<SettingsRepository>,
    queue: Arc<SyncQueueRepository>,
}

impl SqliteSyncStore {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self {
            settings: Arc::new(SettingsRepository::new(Arc::clone(&pool), writer.clone())),
            queue: Arc::new(SyncQueueRepository::new(pool, writer)),
        }
    }
}

#[async_trait]
impl SyncQueueStore for SqliteSyncStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.settings.get_setting(key)
    }

    async fn get_pending_sync_items(&self) -> Result<Vec<SyncQueueItem>> {
        self.queue.list_pending()
    }

    async fn count_pending_sync_items(&self) -> Result<i64> {
        self.queue.count_pending()
    }

    async fn update_sync_item_status(
        &self,
        local_id: i64,
        status: SyncQueueStatus,
        error: Option<String>,
    ) -> Result<()> {
        self.queue.update_status(local_id, status, error).await
    }

    async fn increment_sync_retry(&self, local_id: i64) -> Result<()> {
        self.queue.increment_retry(local_id).await
    }

    async fn mark_record_synced(
        &self,
        table_name: &str,
        record_id: &str,
        synced_at: &str,
    ) -> Result<()> {
        self.queue
            .mark_record_synced(
                table_name.to_string(),
                record_id.to_string(),
                synced_at.to_string(),
            )
            .await
    }
}
