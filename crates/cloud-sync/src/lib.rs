//! Cloud synchronization engine for the point-of-sale terminal.
//!
//! Local mutations are queued in the store's outbox. Once the terminal is
//! online the engine sends them to the cloud in batches and applies the
//! per-entry outcomes back to the store.

mod client;
pub mod engine;
mod error;
mod service;
mod types;

#[cfg(test)]
mod test_support;

pub use client::CloudSyncClient;
pub use engine::{
    BatchPassOutcome, BatchPassSummary, ForceSyncResult, StatusPublisher, SyncEngineConfig,
    SyncEvent, SyncPhase, SyncStatus,
};
pub use error::{ApiRetryClass, CloudSyncError, Result};
pub use service::CloudSyncService;
pub use types::*;
