//! Decides when batch passes run.
//!
//! The periodic schedule is a single tokio task that spawns each pass as its
//! own task, so cancelling the schedule never cancels a pass that already
//! started. Single-flight is enforced by the executor.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use bistro_core::sync::{SyncQueueStore, SyncTrigger};

use super::connectivity::ConnectivityState;
use super::executor::{BatchPassOutcome, BatchPassSummary, BatchSyncExecutor};
use super::ports::ConnectivityObserver;
use super::{timer_period, SyncEngineConfig, SyncSettings};

pub const NO_NETWORK_ERROR: &str = "No network connection";
pub const ALREADY_SYNCING_ERROR: &str = "Sync already in progress";
pub const NOT_CONFIGURED_ERROR: &str = "Cloud sync is not configured";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Scheduled,
    Running,
}

/// Result handed back to the UI for a manual sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceSyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BatchPassSummary>,
}

impl ForceSyncResult {
    fn succeeded(summary: Option<BatchPassSummary>) -> Self {
        Self {
            success: true,
            error: None,
            summary,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            summary: None,
        }
    }
}

impl From<BatchPassOutcome> for ForceSyncResult {
    fn from(outcome: BatchPassOutcome) -> Self {
        match outcome {
            BatchPassOutcome::AlreadyRunning => Self::failed(ALREADY_SYNCING_ERROR),
            BatchPassOutcome::NotConfigured => Self::failed(NOT_CONFIGURED_ERROR),
            BatchPassOutcome::NothingToSync => Self::succeeded(None),
            BatchPassOutcome::Applied(summary) => Self::succeeded(Some(summary)),
            BatchPassOutcome::TransportFailed(error)
            | BatchPassOutcome::Rejected(error)
            | BatchPassOutcome::StoreFailed(error) => Self::failed(error),
        }
    }
}

pub struct SyncOrchestrator {
    executor: Arc<BatchSyncExecutor>,
    store: Arc<dyn SyncQueueStore>,
    connectivity: Arc<ConnectivityState>,
    config: SyncEngineConfig,
    schedule: Mutex<Option<JoinHandle<()>>>,
    /// Set by `stop()`; online edges are ignored until the next `start()`.
    shut_down: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        executor: Arc<BatchSyncExecutor>,
        store: Arc<dyn SyncQueueStore>,
        connectivity: Arc<ConnectivityState>,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            executor,
            store,
            connectivity,
            config,
            schedule: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.executor.is_syncing()
    }

    pub async fn phase(&self) -> SyncPhase {
        if self.executor.is_syncing() {
            return SyncPhase::Running;
        }
        let scheduled = self
            .schedule
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false);
        if scheduled {
            SyncPhase::Scheduled
        } else {
            SyncPhase::Idle
        }
    }

    /// Starts (or restarts) the periodic schedule.
    pub async fn start(&self) {
        self.shut_down.store(false, Ordering::SeqCst);
        self.schedule_passes(SyncTrigger::Startup).await;
    }

    /// Cancels the periodic schedule for good. A pass already running finishes on its own.
    pub async fn stop(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.cancel_schedule().await;
    }

    async fn cancel_schedule(&self) {
        if let Some(handle) = self.schedule.lock().await.take() {
            handle.abort();
            info!("[CloudSync] Periodic sync stopped");
        }
    }

    /// Runs a pass now, outside the schedule.
    pub async fn force_sync(&self) -> ForceSyncResult {
        if !self.connectivity.is_online() {
            return ForceSyncResult::failed(NO_NETWORK_ERROR);
        }
        if self.executor.is_syncing() {
            return ForceSyncResult::failed(ALREADY_SYNCING_ERROR);
        }
        self.executor.run_pass(SyncTrigger::Manual).await.into()
    }

    async fn sync_interval(&self) -> Duration {
        match SyncSettings::load(self.store.as_ref(), &self.config).await {
            Ok(settings) => {
                if !settings.is_cloud_configured() {
                    info!("[CloudSync] No cloud API URL configured; passes are no-ops until one is set");
                }
                settings.sync_interval
            }
            Err(err) => {
                warn!(
                    "[CloudSync] Failed to read sync interval, using default: {}",
                    err
                );
                self.config.default_sync_interval
            }
        }
    }

    async fn schedule_passes(&self, first_trigger: SyncTrigger) {
        let period = timer_period(self.sync_interval().await);
        let mut guard = self.schedule.lock().await;
        if first_trigger == SyncTrigger::Online {
            // Edges can be delivered out of order; trust the current state.
            if self.shut_down.load(Ordering::SeqCst) {
                debug!("[CloudSync] Online edge ignored: engine stopped");
                return;
            }
            if !self.connectivity.is_online() {
                debug!("[CloudSync] Online edge ignored: offline again");
                return;
            }
        }
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        *guard = Some(tokio::spawn(run_schedule(
            Arc::clone(&self.executor),
            Arc::clone(&self.connectivity),
            period,
            first_trigger,
        )));
        info!(
            "[CloudSync] Periodic sync every {:?} ({})",
            period,
            first_trigger.as_str()
        );
    }
}

async fn run_schedule(
    executor: Arc<BatchSyncExecutor>,
    connectivity: Arc<ConnectivityState>,
    period: Duration,
    first_trigger: SyncTrigger,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut trigger = first_trigger;
    loop {
        ticker.tick().await;
        if !connectivity.is_online() {
            debug!("[CloudSync] Tick skipped: offline");
        } else if executor.is_syncing() {
            debug!("[CloudSync] Tick skipped: pass in flight");
        } else {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                executor.run_pass(trigger).await;
            });
        }
        trigger = SyncTrigger::Periodic;
    }
}

#[async_trait]
impl ConnectivityObserver for SyncOrchestrator {
    async fn on_connectivity_changed(&self, online: bool) {
        if online {
            self.schedule_passes(SyncTrigger::Online).await;
        } else {
            self.cancel_schedule().await;
        }
    }
}
