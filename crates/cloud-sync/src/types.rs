//! Wire types for the batch sync endpoint.

use serde::{Deserialize, Serialize};

use bistro_core::sync::SyncOperation;

use crate::error::{CloudSyncError, Result};

/// One outbox entry as sent to `POST /api/sync/batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncEntry {
    pub local_id: i64,
    pub table: String,
    pub operation: SyncOperation,
    pub record: serde_json::Value,
    pub timestamp: String,
}

/// Response body of the batch endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Option<Vec<BatchItemResult>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BatchSyncResponse {
    /// Per-entry results of a structurally valid response.
    ///
    /// `success: false` or a missing `results` list rejects the whole batch.
    pub fn into_results(self) -> Result<Vec<BatchItemResult>> {
        if !self.success {
            return Err(CloudSyncError::Rejected(
                self.error
                    .unwrap_or_else(|| "Server reported failure".to_string()),
            ));
        }
        self.results.ok_or_else(|| {
            CloudSyncError::Rejected("Response is missing per-entry results".to_string())
        })
    }
}

/// Per-entry result, matched to the outbox by `local_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub local_id: i64,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// How the engine treats a per-entry result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchItemOutcome {
    Success,
    Conflict,
    /// Anything else, including unrecognized statuses.
    Retry,
}

impl BatchItemOutcome {
    pub fn classify(status: &str) -> Self {
        let status = status.trim();
        if status.eq_ignore_ascii_case("success") {
            BatchItemOutcome::Success
        } else if status.eq_ignore_ascii_case("conflict") {
            BatchItemOutcome::Conflict
        } else {
            BatchItemOutcome::Retry
        }
    }
}

impl BatchItemResult {
    pub fn outcome(&self) -> BatchItemOutcome {
        BatchItemOutcome::classify(&self.status)
    }
}
