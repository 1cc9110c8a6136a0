//! Internet reachability tracking.
//!
//! A periodic probe feeds [`ConnectivityState`]; only changes of the probed
//! value are published and forwarded to the observer.

use async_trait::async_trait;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ports::{ConnectivityObserver, ReachabilityProbe};
use super::publisher::StatusPublisher;
use super::timer_period;

/// Shared online flag. Starts offline until the first probe says otherwise.
#[derive(Debug, Default)]
pub struct ConnectivityState {
    online: AtomicBool,
}

impl ConnectivityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Stores `online` and returns the previous value.
    pub(crate) fn replace(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }
}

/// Resolves a well-known host. Reachable means at least one address came back
/// within the timeout.
#[derive(Debug, Clone)]
pub struct DnsReachabilityProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl DnsReachabilityProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for DnsReachabilityProbe {
    async fn probe(&self) -> bool {
        let lookup = tokio::net::lookup_host((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(err)) => {
                debug!("[Connectivity] Lookup of {} failed: {}", self.host, err);
                false
            }
            Err(_) => {
                debug!(
                    "[Connectivity] Lookup of {} timed out after {:?}",
                    self.host, self.timeout
                );
                false
            }
        }
    }
}

pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    state: Arc<ConnectivityState>,
    publisher: StatusPublisher,
    observer: Option<Arc<dyn ConnectivityObserver>>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        state: Arc<ConnectivityState>,
        publisher: StatusPublisher,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            state,
            publisher,
            observer: None,
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConnectivityObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    /// Probes once and returns the sampled value. Transitions are announced
    /// after the state is updated.
    pub async fn check_now(&self) -> bool {
        let online = self.probe.probe().await;
        let was_online = self.state.replace(online);
        if was_online == online {
            return online;
        }

        info!(
            "[Connectivity] {}",
            if online { "Back online" } else { "Went offline" }
        );
        self.publisher.network_status_changed(online);
        if let Some(observer) = &self.observer {
            observer.on_connectivity_changed(online).await;
        }
        online
    }

    /// Starts the probe loop. The first probe runs immediately.
    pub async fn start(self: &Arc<Self>) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let monitor = Arc::clone(self);
        let period = timer_period(self.interval);
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.check_now().await;
            }
        }));
        debug!("[Connectivity] Probe loop started ({:?})", period);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            debug!("[Connectivity] Probe loop stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}
