use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BatchSyncEntry, BatchSyncResponse};

/// Delivers one batch to the cloud service.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn post_batch(
        &self,
        base_url: &str,
        entries: &[BatchSyncEntry],
    ) -> Result<BatchSyncResponse>;
}

/// Answers "can we reach the internet right now".
///
/// Implementations must not fail; any error or timeout reads as unreachable.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Notified once per connectivity edge, never on repeated samples.
#[async_trait]
pub trait ConnectivityObserver: Send + Sync {
    async fn on_connectivity_changed(&self, online: bool);
}
