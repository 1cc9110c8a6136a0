//! Repository for the cloud sync outbox (`sync_queue`) and synced-at stamping.

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use log::debug;
use std::sync::Arc;

use bistro_core::errors::{Error, Result};
use bistro_core::sync::{SyncOperation, SyncQueueItem, SyncQueueStatus, POS_SYNC_TABLES};

use super::model::{NewSyncQueueItemDB, SyncQueueItemDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_queue;

fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

fn validate_sync_table(table: &str) -> Result<()> {
    if POS_SYNC_TABLES.contains(&table) {
        return Ok(());
    }
    Err(Error::validation(format!("Unsupported sync table '{}'", table)))
}

fn quote_identifier(value: &str) -> String {
    format!("`{}`", value.replace('`', "``"))
}

fn to_queue_item(row: SyncQueueItemDB) -> Result<SyncQueueItem> {
    Ok(SyncQueueItem {
        id: row.id,
        table_name: row.table_name,
        operation: enum_from_db(&row.operation)?,
        record_id: row.record_id,
        payload: row.payload,
        created_at: row.created_at,
        status: enum_from_db(&row.status)?,
        retry_count: row.retry_count,
        last_error: row.last_error,
    })
}

/// A local mutation to append to the outbox.
#[derive(Debug, Clone)]
pub struct SyncQueueWriteRequest {
    pub table_name: String,
    pub operation: SyncOperation,
    pub record_id: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

impl SyncQueueWriteRequest {
    pub fn new(
        table_name: impl Into<String>,
        record_id: impl Into<String>,
        operation: SyncOperation,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            operation,
            record_id: record_id.into(),
            payload,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Appends an outbox row using the caller's connection.
///
/// Call this from inside a `WriteHandle::exec` job so the business mutation and
/// its outbox row commit or roll back together. Returns the new local id.
pub fn write_sync_queue_item(
    conn: &mut SqliteConnection,
    request: SyncQueueWriteRequest,
) -> Result<i64> {
    validate_sync_table(&request.table_name)?;

    let row = NewSyncQueueItemDB {
        table_name: request.table_name,
        operation: enum_to_db(&request.operation)?,
        record_id: request.record_id,
        payload: serde_json::to_string(&request.payload)?,
        created_at: request.created_at,
        status: enum_to_db(&SyncQueueStatus::Pending)?,
        retry_count: 0,
    };

    let local_id = diesel::insert_into(sync_queue::table)
        .values(&row)
        .returning(sync_queue::id)
        .get_result::<i64>(conn)
        .map_err(StorageError::from)?;
    Ok(local_id)
}

pub struct SyncQueueRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncQueueRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    pub async fn enqueue(&self, request: SyncQueueWriteRequest) -> Result<i64> {
        self.writer
            .exec(move |conn| write_sync_queue_item(conn, request))
            .await
    }

    pub fn get_item(&self, local_id: i64) -> Result<Option<SyncQueueItem>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_queue::table
            .find(local_id)
            .select(SyncQueueItemDB::as_select())
            .first::<SyncQueueItemDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(to_queue_item).transpose()
    }

    pub fn list_pending(&self) -> Result<Vec<SyncQueueItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_queue::table
            .filter(sync_queue::status.eq(enum_to_db(&SyncQueueStatus::Pending)?))
            .order((sync_queue::created_at.asc(), sync_queue::id.asc()))
            .select(SyncQueueItemDB::as_select())
            .load::<SyncQueueItemDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter().map(to_queue_item).collect()
    }

    pub fn list_failed(&self) -> Result<Vec<SyncQueueItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_queue::table
            .filter(sync_queue::status.eq(enum_to_db(&SyncQueueStatus::Failed)?))
            .order((sync_queue::created_at.asc(), sync_queue::id.asc()))
            .select(SyncQueueItemDB::as_select())
            .load::<SyncQueueItemDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter().map(to_queue_item).collect()
    }

    pub fn count_pending(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_queue::table
            .filter(sync_queue::status.eq(enum_to_db(&SyncQueueStatus::Pending)?))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }

    /// Moves a pending row to `status`. Rows that already left `pending` are not touched,
    /// which makes replaying an outcome a no-op.
    pub async fn update_status(
        &self,
        local_id: i64,
        status: SyncQueueStatus,
        error: Option<String>,
    ) -> Result<()> {
        let last_error = match status {
            SyncQueueStatus::Failed => error,
            _ => None,
        };

        self.writer
            .exec(move |conn| {
                let updated = diesel::update(
                    sync_queue::table
                        .filter(sync_queue::id.eq(local_id))
                        .filter(sync_queue::status.eq(enum_to_db(&SyncQueueStatus::Pending)?)),
                )
                .set((
                    sync_queue::status.eq(enum_to_db(&status)?),
                    sync_queue::last_error.eq(last_error),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                if updated == 0 {
                    debug!(
                        "Sync queue item {} is no longer pending; status update to '{}' skipped",
                        local_id,
                        status.as_str()
                    );
                }
                Ok(())
            })
            .await
    }

    pub async fn increment_retry(&self, local_id: i64) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(
                    sync_queue::table
                        .filter(sync_queue::id.eq(local_id))
                        .filter(sync_queue::status.eq(enum_to_db(&SyncQueueStatus::Pending)?)),
                )
                .set(sync_queue::retry_count.eq(sync_queue::retry_count + 1))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Stamps `synced_at` on a business record. Missing records (e.g. deleted ones) are ignored.
    pub async fn mark_record_synced(
        &self,
        table_name: String,
        record_id: String,
        synced_at: String,
    ) -> Result<()> {
        validate_sync_table(&table_name)?;

        self.writer
            .exec(move |conn| {
                let sql = format!(
                    "UPDATE {} SET synced_at = ? WHERE id = ?",
                    quote_identifier(&table_name)
                );
                let updated = diesel::sql_query(sql)
                    .bind::<Text, _>(synced_at)
                    .bind::<Text, _>(record_id.clone())
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if updated == 0 {
                    debug!(
                        "No '{}' record with id '{}' to stamp as synced",
                        table_name, record_id
                    );
                }
                Ok(())
            })
            .await
    }
}
