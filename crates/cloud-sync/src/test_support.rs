//! In-memory fakes shared by the engine tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use bistro_core::sync::{
    SyncOperation, SyncQueueItem, SyncQueueStatus, SyncQueueStore, SETTING_CLOUD_API_URL,
};

use crate::engine::{BatchTransport, ConnectivityObserver, ReachabilityProbe};
use crate::error::{CloudSyncError, Result};
use crate::types::{BatchItemResult, BatchSyncEntry, BatchSyncResponse};

pub const TEST_CLOUD_URL: &str = "https://cloud.test";

pub fn item_result(local_id: i64, status: &str, error: Option<&str>) -> BatchItemResult {
    BatchItemResult {
        local_id,
        status: status.to_string(),
        error: error.map(str::to_string),
    }
}

#[derive(Default)]
pub struct MemorySyncStore {
    settings: Mutex<HashMap<String, String>>,
    items: Mutex<Vec<SyncQueueItem>>,
    stamps: Mutex<Vec<(String, String, String)>>,
    status_writes: AtomicUsize,
    fail_stamps: AtomicBool,
}

impl MemorySyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configured() -> Self {
        Self::new().with_cloud_url(TEST_CLOUD_URL)
    }

    pub fn with_cloud_url(self, url: &str) -> Self {
        self.with_setting(SETTING_CLOUD_API_URL, url)
    }

    pub fn with_setting(self, key: &str, value: &str) -> Self {
        self.set_setting(key, value);
        self
    }

    pub fn set_setting(&self, key: &str, value: &str) {
        self.settings
            .lock()
            .expect("settings lock")
            .insert(key.to_string(), value.to_string());
    }

    pub fn push_item(&self, table_name: &str, record_id: &str, payload: &str) -> i64 {
        let mut items = self.items.lock().expect("items lock");
        let id = items.len() as i64 + 1;
        items.push(SyncQueueItem {
            id,
            table_name: table_name.to_string(),
            operation: SyncOperation::Update,
            record_id: record_id.to_string(),
            payload: payload.to_string(),
            created_at: format!("2026-01-01T12:00:{:02}+00:00", id % 60),
            status: SyncQueueStatus::Pending,
            retry_count: 0,
            last_error: None,
        });
        id
    }

    pub fn set_retry_count(&self, id: i64, retry_count: i32) {
        let mut items = self.items.lock().expect("items lock");
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            item.retry_count = retry_count;
        }
    }

    pub fn item(&self, id: i64) -> SyncQueueItem {
        self.items
            .lock()
            .expect("items lock")
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .expect("item exists")
    }

    pub fn items(&self) -> Vec<SyncQueueItem> {
        self.items.lock().expect("items lock").clone()
    }

    pub fn pending_count(&self) -> usize {
        self.items()
            .iter()
            .filter(|item| item.status == SyncQueueStatus::Pending)
            .count()
    }

    /// `(table, record_id, synced_at)` for every stamp applied.
    pub fn stamps(&self) -> Vec<(String, String, String)> {
        self.stamps.lock().expect("stamps lock").clone()
    }

    /// Status updates that actually changed a row.
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn fail_stamps(&self, fail: bool) {
        self.fail_stamps.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncQueueStore for MemorySyncStore {
    async fn get_setting(&self, key: &str) -> bistro_core::Result<Option<String>> {
        Ok(self.settings.lock().expect("settings lock").get(key).cloned())
    }

    async fn get_pending_sync_items(&self) -> bistro_core::Result<Vec<SyncQueueItem>> {
        let mut pending: Vec<SyncQueueItem> = self
            .items()
            .into_iter()
            .filter(|item| item.status == SyncQueueStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn update_sync_item_status(
        &self,
        local_id: i64,
        status: SyncQueueStatus,
        error: Option<String>,
    ) -> bistro_core::Result<()> {
        let mut items = self.items.lock().expect("items lock");
        if let Some(item) = items
            .iter_mut()
            .find(|item| item.id == local_id && item.status == SyncQueueStatus::Pending)
        {
            item.status = status;
            item.last_error = match status {
                SyncQueueStatus::Failed => error,
                _ => None,
            };
            self.status_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn increment_sync_retry(&self, local_id: i64) -> bistro_core::Result<()> {
        let mut items = self.items.lock().expect("items lock");
        if let Some(item) = items
            .iter_mut()
            .find(|item| item.id == local_id && item.status == SyncQueueStatus::Pending)
        {
            item.retry_count += 1;
        }
        Ok(())
    }

    async fn mark_record_synced(
        &self,
        table_name: &str,
        record_id: &str,
        synced_at: &str,
    ) -> bistro_core::Result<()> {
        if self.fail_stamps.load(Ordering::SeqCst) {
            return Err(bistro_core::Error::unexpected("stamp failed"));
        }
        self.stamps.lock().expect("stamps lock").push((
            table_name.to_string(),
            record_id.to_string(),
            synced_at.to_string(),
        ));
        Ok(())
    }
}

/// Replays scripted responses, then answers every entry with the fallback status.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<BatchSyncResponse>>>,
    fallback_status: String,
    calls: Mutex<Vec<Vec<BatchSyncEntry>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    entered: Notify,
    gate: Option<Semaphore>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<BatchSyncResponse>>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            fallback_status: "success".to_string(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            entered: Notify::new(),
            gate: None,
        }
    }

    /// Every call blocks until [`ScriptedTransport::release`] hands it a permit.
    pub fn gated(responses: Vec<Result<BatchSyncResponse>>) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(responses)
        }
    }

    pub fn with_fallback_status(mut self, status: &str) -> Self {
        self.fallback_status = status.to_string();
        self
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub async fn wait_for_call(&self) {
        tokio::time::timeout(Duration::from_secs(2), self.entered.notified())
            .await
            .expect("transport was not called");
    }

    pub fn calls(&self) -> Vec<Vec<BatchSyncEntry>> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn fallback_response(&self, entries: &[BatchSyncEntry]) -> BatchSyncResponse {
        BatchSyncResponse {
            success: true,
            results: Some(
                entries
                    .iter()
                    .map(|entry| item_result(entry.local_id, &self.fallback_status, None))
                    .collect(),
            ),
            error: None,
        }
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn post_batch(
        &self,
        _base_url: &str,
        entries: &[BatchSyncEntry],
    ) -> Result<BatchSyncResponse> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(entries.to_vec());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| CloudSyncError::invalid_request("gate closed"))?
                .forget();
        }

        let scripted = self.responses.lock().expect("responses lock").pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| Ok(self.fallback_response(entries)))
    }
}

/// Returns scripted samples, repeating the last one once the script runs out.
pub struct ScriptedProbe {
    samples: Mutex<VecDeque<bool>>,
    last: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(samples: Vec<bool>) -> Self {
        Self {
            samples: Mutex::new(VecDeque::from(samples)),
            last: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.samples.lock().expect("samples lock").pop_front() {
            Some(sample) => {
                self.last.store(sample, Ordering::SeqCst);
                sample
            }
            None => self.last.load(Ordering::SeqCst),
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    transitions: Mutex<Vec<bool>>,
}

impl RecordingObserver {
    pub fn transitions(&self) -> Vec<bool> {
        self.transitions.lock().expect("transitions lock").clone()
    }
}

#[async_trait]
impl ConnectivityObserver for RecordingObserver {
    async fn on_connectivity_changed(&self, online: bool) {
        self.transitions
            .lock()
            .expect("transitions lock")
            .push(online);
    }
}

