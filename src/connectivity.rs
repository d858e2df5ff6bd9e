//! Connectivity Module
//!
//! Network reachability as a boolean plus a change-event stream.

use tokio::sync::watch;

// == Connectivity Source ==
/// Source of online/offline state.
pub trait ConnectivitySource: Send + Sync {
    /// Current state.
    fn is_online(&self) -> bool;

    /// Receiver that observes every state transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

// == Manual Connectivity ==
/// Connectivity driven by explicit `set_online` calls, e.g. from a platform
/// reachability callback or a test.
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Updates the state; subscribers are notified only on an actual change.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }
}

impl ConnectivitySource for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transition_is_observed() {
        let connectivity = ManualConnectivity::new(false);
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(connectivity.is_online());
    }

    #[tokio::test]
    async fn test_same_state_does_not_notify() {
        let connectivity = ManualConnectivity::new(true);
        let rx = connectivity.subscribe();

        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
