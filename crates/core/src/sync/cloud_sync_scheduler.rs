//! Scheduler constants and settings helpers for cloud sync.

use serde::{Deserialize, Serialize};

/// Setting holding the remote endpoint base URL.
pub const SETTING_CLOUD_API_URL: &str = "cloud_api_url";

/// Setting holding the sync cadence in milliseconds.
pub const SETTING_SYNC_INTERVAL: &str = "sync_interval";

/// Setting holding the retry ceiling for transient item failures.
pub const SETTING_SYNC_MAX_RETRIES: &str = "sync_max_retries";

/// Default sync cadence in milliseconds.
pub const CLOUD_SYNC_DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Default retry ceiling before an item is parked.
pub const CLOUD_SYNC_DEFAULT_MAX_RETRIES: i32 = 25;

/// Timeout for the batch request in seconds.
pub const CLOUD_SYNC_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Reachability probe cadence in seconds.
pub const CONNECTIVITY_PROBE_INTERVAL_SECS: u64 = 10;

/// Upper bound for a single reachability probe in seconds.
pub const CONNECTIVITY_PROBE_TIMEOUT_SECS: u64 = 5;

/// Well-known public host resolved by the reachability probe.
pub const CONNECTIVITY_PROBE_HOST: &str = "google.com";

pub const CONNECTIVITY_PROBE_PORT: u16 = 443;

/// Trigger source for sync passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Startup,
    Online,
    Periodic,
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Startup => "startup",
            SyncTrigger::Online => "online",
            SyncTrigger::Periodic => "periodic",
            SyncTrigger::Manual => "manual",
        }
    }
}

/// Normalizes the configured cloud URL. Blank values mean "not configured".
pub fn normalize_cloud_api_url(raw: Option<&str>) -> Option<String> {
    raw.map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
}

/// Parses the `sync_interval` setting, falling back to the default for missing,
/// unparsable or zero values.
pub fn parse_sync_interval_ms(raw: Option<&str>, default_ms: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_ms)
}

/// Parses the `sync_max_retries` setting. Zero or negative values fall back to the default.
pub fn parse_max_retries(raw: Option<&str>, default_value: i32) -> i32 {
    raw.and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_value)
}
