//! Observable connection status.
//!
//! Wraps the pure [`Lifecycle`] machine so that several tasks can feed it
//! events while the UI watches the resulting status.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_core::{Action, ConnectionStatus, Event, Lifecycle, RetryPolicy};
use tokio::sync::watch;

/// Shared lifecycle plus a watch channel of its status.
///
/// Clones share the same lifecycle.
#[derive(Debug, Clone)]
pub struct StatusCell {
    inner: Arc<StatusInner>,
}

#[derive(Debug)]
struct StatusInner {
    lifecycle: Mutex<Lifecycle>,
    tx: watch::Sender<ConnectionStatus>,
}

impl StatusCell {
    /// Create a cell in the Disconnected state.
    pub fn new(policy: RetryPolicy) -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(StatusInner {
                lifecycle: Mutex::new(Lifecycle::new(policy)),
                tx,
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one event to the lifecycle.
    ///
    /// Status changes are published immediately; every returned action is
    /// left for the caller to execute, in order.
    pub fn apply(&self, event: Event) -> Vec<Action> {
        let mut lifecycle = self.lifecycle();
        let (next, actions) = std::mem::take(&mut *lifecycle).on_event(event);
        *lifecycle = next;

        for action in &actions {
            if let Action::EmitStatus(status) = action {
                self.inner.tx.send_replace(*status);
            }
        }
        actions
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.tx.borrow()
    }

    /// Consecutive failures since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.lifecycle().attempt()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.tx.subscribe()
    }
}

/// Resolves once `stop` flips to true or its sender is gone.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
