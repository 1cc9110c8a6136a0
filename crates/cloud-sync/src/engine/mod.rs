//! Sync engine: connectivity tracking, scheduling and batch passes.

mod connectivity;
mod executor;
mod orchestrator;
mod ports;
mod publisher;

use std::time::Duration;

use bistro_core::sync::{
    normalize_cloud_api_url, parse_max_retries, parse_sync_interval_ms, SyncQueueStore,
    CLOUD_SYNC_DEFAULT_INTERVAL_MS, CLOUD_SYNC_DEFAULT_MAX_RETRIES,
    CLOUD_SYNC_REQUEST_TIMEOUT_SECS, CONNECTIVITY_PROBE_HOST, CONNECTIVITY_PROBE_INTERVAL_SECS,
    CONNECTIVITY_PROBE_PORT, CONNECTIVITY_PROBE_TIMEOUT_SECS, SETTING_CLOUD_API_URL,
    SETTING_SYNC_INTERVAL, SETTING_SYNC_MAX_RETRIES,
};

pub use connectivity::{ConnectivityMonitor, ConnectivityState, DnsReachabilityProbe};
pub use executor::{BatchPassOutcome, BatchPassSummary, BatchSyncExecutor};
pub use orchestrator::{
    ForceSyncResult, SyncOrchestrator, SyncPhase, ALREADY_SYNCING_ERROR, NOT_CONFIGURED_ERROR,
    NO_NETWORK_ERROR,
};
pub use ports::{BatchTransport, ConnectivityObserver, ReachabilityProbe};
pub use publisher::{
    StatusPublisher, SyncEvent, SyncStatus, NETWORK_STATUS_CHANGED_EVENT,
    SYNC_STATUS_CHANGED_EVENT,
};

const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// `tokio::time::interval` panics on a zero period.
pub(crate) fn timer_period(period: Duration) -> Duration {
    period.max(MIN_TIMER_PERIOD)
}

/// Process-level engine tuning. Store settings override the sync defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEngineConfig {
    pub probe_host: String,
    pub probe_port: u16,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    pub default_sync_interval: Duration,
    pub default_max_retries: i32,
    pub event_capacity: usize,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            probe_host: CONNECTIVITY_PROBE_HOST.to_string(),
            probe_port: CONNECTIVITY_PROBE_PORT,
            probe_interval: Duration::from_secs(CONNECTIVITY_PROBE_INTERVAL_SECS),
            probe_timeout: Duration::from_secs(CONNECTIVITY_PROBE_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(CLOUD_SYNC_REQUEST_TIMEOUT_SECS),
            default_sync_interval: Duration::from_millis(CLOUD_SYNC_DEFAULT_INTERVAL_MS),
            default_max_retries: CLOUD_SYNC_DEFAULT_MAX_RETRIES,
            event_capacity: 64,
        }
    }
}

impl SyncEngineConfig {
    pub fn with_probe_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.probe_host = host.into();
        self.probe_port = port;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_default_sync_interval(mut self, interval: Duration) -> Self {
        self.default_sync_interval = interval;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: i32) -> Self {
        self.default_max_retries = max_retries;
        self
    }
}

/// Store-backed settings, read fresh whenever they are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub cloud_api_url: Option<String>,
    pub sync_interval: Duration,
    pub max_retries: i32,
}

impl SyncSettings {
    pub async fn load(
        store: &dyn SyncQueueStore,
        config: &SyncEngineConfig,
    ) -> bistro_core::Result<Self> {
        let cloud_api_url = store.get_setting(SETTING_CLOUD_API_URL).await?;
        let sync_interval = store.get_setting(SETTING_SYNC_INTERVAL).await?;
        let max_retries = store.get_setting(SETTING_SYNC_MAX_RETRIES).await?;

        let default_interval_ms = u64::try_from(config.default_sync_interval.as_millis())
            .unwrap_or(CLOUD_SYNC_DEFAULT_INTERVAL_MS);
        Ok(Self {
            cloud_api_url: normalize_cloud_api_url(cloud_api_url.as_deref()),
            sync_interval: Duration::from_millis(parse_sync_interval_ms(
                sync_interval.as_deref(),
                default_interval_ms,
            )),
            max_retries: parse_max_retries(max_retries.as_deref(), config.default_max_retries),
        })
    }

    pub fn is_cloud_configured(&self) -> bool {
        self.cloud_api_url.is_some()
    }
}
