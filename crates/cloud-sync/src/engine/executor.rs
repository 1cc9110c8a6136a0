//! Batch pass: drain the outbox, send it in one call, apply per-entry results.

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bistro_core::sync::{SyncQueueItem, SyncQueueStatus, SyncQueueStore, SyncTrigger};

use super::ports::BatchTransport;
use super::publisher::StatusPublisher;
use super::{SyncEngineConfig, SyncSettings};
use crate::error::ApiRetryClass;
use crate::types::{BatchItemOutcome, BatchItemResult, BatchSyncEntry};

const DEFAULT_CONFLICT_REASON: &str = "Conflict";

/// Per-pass counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPassSummary {
    /// Items sent in the batch.
    pub attempted: usize,
    pub completed: usize,
    pub conflicted: usize,
    pub retried: usize,
    /// Sent items the server did not answer for; they stay pending.
    pub unmatched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPassOutcome {
    /// Another pass held the single-flight guard.
    AlreadyRunning,
    NotConfigured,
    /// Nothing eligible in the outbox; no remote call was made.
    NothingToSync,
    Applied(BatchPassSummary),
    /// The call failed before a response could be read. Nothing was mutated.
    TransportFailed(String),
    /// The server answered without usable per-entry results. Nothing was mutated.
    Rejected(String),
    StoreFailed(String),
}

/// Holds the single-flight flag for the lifetime of a pass. Dropping it
/// clears the flag and announces `syncing: false`, on every exit path.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    publisher: &'a StatusPublisher,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.publisher.sync_status_changed(false);
    }
}

/// The drained items of one pass, indexed by local id, and the entries sent for them.
struct SyncSession<'a> {
    items: HashMap<i64, SyncQueueItem>,
    entries: Vec<BatchSyncEntry>,
    _guard: InFlightGuard<'a>,
}

impl<'a> SyncSession<'a> {
    fn new(drained: Vec<SyncQueueItem>, guard: InFlightGuard<'a>) -> Self {
        let entries = drained.iter().map(to_batch_entry).collect();
        let items = drained.into_iter().map(|item| (item.id, item)).collect();
        Self {
            items,
            entries,
            _guard: guard,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn item(&self, local_id: i64) -> Option<&SyncQueueItem> {
        self.items.get(&local_id)
    }
}

fn to_batch_entry(item: &SyncQueueItem) -> BatchSyncEntry {
    let record = serde_json::from_str(&item.payload).unwrap_or_else(|err| {
        warn!(
            "[CloudSync] Payload of outbox item {} is not JSON ({}); sending it as a string",
            item.id, err
        );
        serde_json::Value::String(item.payload.clone())
    });
    BatchSyncEntry {
        local_id: item.id,
        table: item.table_name.clone(),
        operation: item.operation,
        record,
        timestamp: item.created_at.clone(),
    }
}

pub struct BatchSyncExecutor {
    store: Arc<dyn SyncQueueStore>,
    transport: Arc<dyn BatchTransport>,
    publisher: StatusPublisher,
    config: SyncEngineConfig,
    syncing: AtomicBool,
}

impl BatchSyncExecutor {
    pub fn new(
        store: Arc<dyn SyncQueueStore>,
        transport: Arc<dyn BatchTransport>,
        publisher: StatusPublisher,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            store,
            transport,
            publisher,
            config,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.publisher.sync_status_changed(true);
        Some(InFlightGuard {
            flag: &self.syncing,
            publisher: &self.publisher,
        })
    }

    /// Runs one pass. Never fails; every problem ends up in the outcome and the log.
    pub async fn run_pass(&self, trigger: SyncTrigger) -> BatchPassOutcome {
        let settings = match SyncSettings::load(self.store.as_ref(), &self.config).await {
            Ok(settings) => settings,
            Err(err) => {
                error!("[CloudSync] Failed to read sync settings: {}", err);
                return BatchPassOutcome::StoreFailed(err.to_string());
            }
        };
        let Some(base_url) = settings.cloud_api_url.as_deref() else {
            debug!(
                "[CloudSync] Skipping {} pass: cloud sync is not configured",
                trigger.as_str()
            );
            return BatchPassOutcome::NotConfigured;
        };
        let Some(guard) = self.try_begin() else {
            debug!(
                "[CloudSync] Skipping {} pass: another pass is in flight",
                trigger.as_str()
            );
            return BatchPassOutcome::AlreadyRunning;
        };

        let outcome = self
            .drain_and_send(base_url, settings.max_retries, guard)
            .await;
        match &outcome {
            BatchPassOutcome::Applied(summary) => debug!(
                "[CloudSync] {} pass done attempted={} completed={} conflicted={} retried={} unmatched={}",
                trigger.as_str(),
                summary.attempted,
                summary.completed,
                summary.conflicted,
                summary.retried,
                summary.unmatched
            ),
            BatchPassOutcome::NothingToSync => {
                debug!("[CloudSync] {} pass: outbox is empty", trigger.as_str())
            }
            other => debug!("[CloudSync] {} pass ended: {:?}", trigger.as_str(), other),
        }
        outcome
    }

    async fn drain_and_send(
        &self,
        base_url: &str,
        max_retries: i32,
        guard: InFlightGuard<'_>,
    ) -> BatchPassOutcome {
        let pending = match self.store.get_pending_sync_items().await {
            Ok(items) => items,
            Err(err) => {
                error!("[CloudSync] Failed to read outbox: {}", err);
                return BatchPassOutcome::StoreFailed(err.to_string());
            }
        };

        let total = pending.len();
        let drained: Vec<SyncQueueItem> = pending
            .into_iter()
            .filter(|item| item.retry_count < max_retries)
            .collect();
        if drained.len() < total {
            debug!(
                "[CloudSync] {} item(s) reached {} retries and stay pending",
                total - drained.len(),
                max_retries
            );
        }
        if drained.is_empty() {
            return BatchPassOutcome::NothingToSync;
        }

        let session = SyncSession::new(drained, guard);
        info!("[CloudSync] Sending {} outbox item(s)", session.len());

        let response = match self.transport.post_batch(base_url, &session.entries).await {
            Ok(response) => response,
            Err(err) => {
                match err.retry_class() {
                    ApiRetryClass::Retryable => {
                        warn!("[CloudSync] Batch call failed, will retry: {}", err)
                    }
                    ApiRetryClass::Permanent => error!(
                        "[CloudSync] Batch call failed, check the cloud configuration: {}",
                        err
                    ),
                }
                return BatchPassOutcome::TransportFailed(err.to_string());
            }
        };
        let results = match response.into_results() {
            Ok(results) => results,
            Err(err) => {
                warn!("[CloudSync] {}", err);
                return BatchPassOutcome::Rejected(err.to_string());
            }
        };

        BatchPassOutcome::Applied(self.apply_results(&session, results).await)
    }

    /// Applies results sequentially. Results are matched by local id; unknown
    /// ids and duplicates are ignored.
    async fn apply_results(
        &self,
        session: &SyncSession<'_>,
        results: Vec<BatchItemResult>,
    ) -> BatchPassSummary {
        let synced_at = Utc::now().to_rfc3339();
        let mut summary = BatchPassSummary {
            attempted: session.len(),
            ..BatchPassSummary::default()
        };
        let mut answered = HashSet::new();

        for result in results {
            let Some(item) = session.item(result.local_id) else {
                warn!(
                    "[CloudSync] Result for unknown localId {} ignored",
                    result.local_id
                );
                continue;
            };
            if !answered.insert(item.id) {
                debug!("[CloudSync] Duplicate result for item {} ignored", item.id);
                continue;
            }

            match result.outcome() {
                BatchItemOutcome::Success => {
                    if self.apply_success(item, &synced_at).await {
                        summary.completed += 1;
                    }
                }
                BatchItemOutcome::Conflict => {
                    let reason = result
                        .error
                        .unwrap_or_else(|| DEFAULT_CONFLICT_REASON.to_string());
                    warn!(
                        "[CloudSync] Conflict on {} {} (item {}): {}",
                        item.table_name, item.record_id, item.id, reason
                    );
                    match self
                        .store
                        .update_sync_item_status(item.id, SyncQueueStatus::Failed, Some(reason))
                        .await
                    {
                        Ok(()) => summary.conflicted += 1,
                        Err(err) => {
                            warn!("[CloudSync] Failed to mark item {} failed: {}", item.id, err)
                        }
                    }
                }
                BatchItemOutcome::Retry => {
                    debug!(
                        "[CloudSync] Item {} answered '{}', retrying next pass",
                        item.id, result.status
                    );
                    match self.store.increment_sync_retry(item.id).await {
                        Ok(()) => summary.retried += 1,
                        Err(err) => warn!(
                            "[CloudSync] Failed to bump retry count of item {}: {}",
                            item.id, err
                        ),
                    }
                }
            }
        }

        summary.unmatched = session.len().saturating_sub(answered.len());
        summary
    }

    /// Stamps the business record, then completes the item. A failed stamp
    /// leaves the item pending so the next pass re-sends it.
    async fn apply_success(&self, item: &SyncQueueItem, synced_at: &str) -> bool {
        if let Err(err) = self
            .store
            .mark_record_synced(&item.table_name, &item.record_id, synced_at)
            .await
        {
            warn!(
                "[CloudSync] Failed to stamp {} {}: {}",
                item.table_name, item.record_id, err
            );
            return false;
        }
        match self
            .store
            .update_sync_item_status(item.id, SyncQueueStatus::Completed, None)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!("[CloudSync] Failed to complete item {}: {}", item.id, err);
                false
            }
        }
    }
}
