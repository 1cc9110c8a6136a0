//! Status events pushed to the UI.

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const SYNC_STATUS_CHANGED_EVENT: &str = "sync:statusChanged";
pub const NETWORK_STATUS_CHANGED_EVENT: &str = "network:statusChanged";

const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncEvent {
    SyncStatusChanged { syncing: bool },
    NetworkStatusChanged { online: bool },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::SyncStatusChanged { .. } => SYNC_STATUS_CHANGED_EVENT,
            SyncEvent::NetworkStatusChanged { .. } => NETWORK_STATUS_CHANGED_EVENT,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            SyncEvent::SyncStatusChanged { syncing } => serde_json::json!({ "syncing": syncing }),
            SyncEvent::NetworkStatusChanged { online } => serde_json::json!({ "online": online }),
        }
    }
}

/// Point-in-time status for the UI, assembled on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub syncing: bool,
    pub pending_count: i64,
    pub cloud_configured: bool,
}

/// Fan-out of sync and network events.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and a lagging subscriber loses the oldest events.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    sender: broadcast::Sender<SyncEvent>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl StatusPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: SyncEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!(
                "[CloudSync] Emitted {} to {} listener(s)",
                event.name(),
                receivers
            ),
            Err(_) => debug!("[CloudSync] No listeners for {}", event.name()),
        }
    }

    pub fn sync_status_changed(&self, syncing: bool) {
        self.publish(SyncEvent::SyncStatusChanged { syncing });
    }

    pub fn network_status_changed(&self, online: bool) {
        self.publish(SyncEvent::NetworkStatusChanged { online });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}
