//! Connectivity capabilities consumed by the engine
//!
//! The engine never asks the host directly whether it is online. It is
//! handed a [`Connectivity`] implementation: either a [`ConnectivitySignal`]
//! the host flips itself, or a [`PollingConnectivity`] that probes a URL.

use crate::error::{EngineResult, SyncError};
use fieldsync_network::ConnectivityChecker;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Online/offline state plus change notifications
pub trait Connectivity: Send + Sync {
    /// Current state
    fn is_online(&self) -> bool;

    /// Receiver that observes every published transition
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state set explicitly by the host
#[derive(Debug)]
pub struct ConnectivitySignal {
    state: watch::Sender<bool>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    /// Publishes a new state; returns true if it changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
        changed
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

/// Connectivity derived from periodically probing the remote store
pub struct PollingConnectivity {
    signal: Arc<ConnectivitySignal>,
    task: JoinHandle<()>,
}

impl PollingConnectivity {
    /// Starts probing every `interval` on the current tokio runtime
    ///
    /// The state starts as `initial` until the first probe answers.
    pub fn spawn(
        checker: ConnectivityChecker,
        interval: Duration,
        initial: bool,
    ) -> EngineResult<Self> {
        let runtime = Handle::try_current().map_err(|e| SyncError::NoRuntime(e.to_string()))?;
        let signal = Arc::new(ConnectivitySignal::new(initial));

        let publisher = Arc::clone(&signal);
        let task = runtime.spawn(async move {
            loop {
                let online = checker.is_online().await;
                debug!("Connectivity probe: online = {}", online);
                publisher.set_online(online);
                tokio::time::sleep(interval).await;
            }
        });

        Ok(Self { signal, task })
    }
}

impl Connectivity for PollingConnectivity {
    fn is_online(&self) -> bool {
        self.signal.is_online()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

impl Drop for PollingConnectivity {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_publishes_only_changes() {
        let signal = ConnectivitySignal::new(false);
        let mut rx = signal.subscribe();

        assert!(!signal.is_online());
        assert!(!signal.set_online(false));
        assert!(!rx.has_changed().unwrap());

        assert!(signal.set_online(true));
        assert!(signal.is_online());
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }

    #[test]
    fn test_polling_requires_runtime() {
        let client = fieldsync_network::Client::new().unwrap();
        let checker = ConnectivityChecker::new(client, "http://127.0.0.1:9/health");

        let result = PollingConnectivity::spawn(checker, Duration::from_secs(1), true);
        assert!(matches!(result, Err(SyncError::NoRuntime(_))));
    }
}
