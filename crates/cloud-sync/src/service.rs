//! Entry point used by the UI bridge.

use log::{info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

use bistro_core::sync::{normalize_cloud_api_url, SyncQueueStore, SETTING_CLOUD_API_URL};

use crate::client::CloudSyncClient;
use crate::engine::{
    BatchSyncExecutor, BatchTransport, ConnectivityMonitor, ConnectivityState,
    DnsReachabilityProbe, ForceSyncResult, ReachabilityProbe, StatusPublisher, SyncEngineConfig,
    SyncEvent, SyncOrchestrator, SyncPhase, SyncStatus,
};
use crate::error::Result;

/// Wires the connectivity monitor, orchestrator and executor around one store.
pub struct CloudSyncService {
    store: Arc<dyn SyncQueueStore>,
    publisher: StatusPublisher,
    connectivity: Arc<ConnectivityState>,
    monitor: Arc<ConnectivityMonitor>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl CloudSyncService {
    /// Builds the service with the reqwest client and the DNS probe.
    pub fn new(store: Arc<dyn SyncQueueStore>, config: SyncEngineConfig) -> Result<Self> {
        let transport = Arc::new(CloudSyncClient::with_timeout(config.request_timeout)?);
        let probe = Arc::new(DnsReachabilityProbe::new(
            config.probe_host.clone(),
            config.probe_port,
            config.probe_timeout,
        ));
        Ok(Self::with_components(store, transport, probe, config))
    }

    pub fn with_components(
        store: Arc<dyn SyncQueueStore>,
        transport: Arc<dyn BatchTransport>,
        probe: Arc<dyn ReachabilityProbe>,
        config: SyncEngineConfig,
    ) -> Self {
        let publisher = StatusPublisher::new(config.event_capacity);
        let connectivity = Arc::new(ConnectivityState::new());
        let executor = Arc::new(BatchSyncExecutor::new(
            Arc::clone(&store),
            transport,
            publisher.clone(),
            config.clone(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            executor,
            Arc::clone(&store),
            Arc::clone(&connectivity),
            config.clone(),
        ));
        let monitor = Arc::new(
            ConnectivityMonitor::new(
                probe,
                Arc::clone(&connectivity),
                publisher.clone(),
                config.probe_interval,
            )
            .with_observer(orchestrator.clone()),
        );

        Self {
            store,
            publisher,
            connectivity,
            monitor,
            orchestrator,
        }
    }

    /// Starts connectivity probing and the periodic schedule.
    pub async fn start(&self) {
        info!("[CloudSync] Starting sync engine");
        self.monitor.start().await;
        self.orchestrator.start().await;
    }

    /// Stops both timers. An in-flight pass still completes.
    pub async fn stop(&self) {
        self.monitor.stop().await;
        self.orchestrator.stop().await;
        info!("[CloudSync] Sync engine stopped");
    }

    pub async fn force_sync(&self) -> ForceSyncResult {
        self.orchestrator.force_sync().await
    }

    pub async fn check_connectivity(&self) -> bool {
        self.monitor.check_now().await
    }

    pub async fn phase(&self) -> SyncPhase {
        self.orchestrator.phase().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.publisher.subscribe()
    }

    /// Fresh snapshot; the pending count and configuration are read from the store.
    pub async fn get_status(&self) -> SyncStatus {
        let pending_count = match self.store.count_pending_sync_items().await {
            Ok(count) => count,
            Err(err) => {
                warn!("[CloudSync] Failed to count pending items: {}", err);
                0
            }
        };
        let cloud_configured = match self.store.get_setting(SETTING_CLOUD_API_URL).await {
            Ok(value) => normalize_cloud_api_url(value.as_deref()).is_some(),
            Err(err) => {
                warn!("[CloudSync] Failed to read cloud API URL: {}", err);
                false
            }
        };

        SyncStatus {
            online: self.connectivity.is_online(),
            syncing: self.orchestrator.is_syncing(),
            pending_count,
            cloud_configured,
        }
    }
}
