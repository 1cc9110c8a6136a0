//! Database models for the cloud sync outbox.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Queryable, Identifiable, AsChangeset, Selectable, Debug, Clone, Serialize, Deserialize,
)]
#[diesel(table_name = crate::schema::sync_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncQueueItemDB {
    pub id: i64,
    pub table_name: String,
    pub operation: String,
    pub record_id: String,
    pub payload: String,
    pub created_at: String,
    pub status: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_queue)]
pub struct NewSyncQueueItemDB {
    pub table_name: String,
    pub operation: String,
    pub record_id: String,
    pub payload: String,
    pub created_at: String,
    pub status: String,
    pub retry_count: i32,
}
