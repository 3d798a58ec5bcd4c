//! Public-viewer replication engine.
//!
//! A public viewer is started from a [`PublicLink`] and never creates a
//! session. It connects with the `public-viewer` hint, replaces its
//! projection with every bare [`PublicState`] the host pushes, and is the
//! only role that reconnects on its own:
//!
//! ```text
//! connect ─ok─► connected ─close/error─► wait min(max, base·2^attempt) ─► connect
//!    └─fail──────────────────────────────┘
//! ```
//!
//! The attempt counter resets on every successful open.

use std::sync::{Arc, Mutex, PoisonError};
use sync_core::{Action, Backoff, ConnectionStatus, Event, PublicLink, RetryPolicy};
use sync_types::{ConnectMetadata, PublicState, SessionId};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::status::{stop_requested, StatusCell};
use crate::transport::{Signaling, MAX_MESSAGE_SIZE};

/// Read-only follower of a session's public projection.
pub struct PublicViewer {
    task: ViewerTask,
    running: Mutex<Option<Running>>,
}

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Running {
    // the loop closes its own channel when it sees the flag
    fn stop(self) {
        self.stop.send_replace(true);
        drop(self.handle);
    }
}

#[derive(Clone)]
struct ViewerTask {
    signaling: Arc<dyn Signaling>,
    session: SessionId,
    status: StatusCell,
    projection: Arc<watch::Sender<Option<PublicState>>>,
    message_limit: usize,
}

impl PublicViewer {
    /// Create a viewer for the session named by `link`. Call [`start`](Self::start) to connect.
    pub fn new(signaling: Arc<dyn Signaling>, link: &PublicLink, backoff: Backoff) -> Self {
        let (projection, _) = watch::channel(None);
        Self {
            task: ViewerTask {
                signaling,
                session: link.session().clone(),
                status: StatusCell::new(RetryPolicy::Backoff(backoff)),
                projection: Arc::new(projection),
                message_limit: MAX_MESSAGE_SIZE,
            },
            running: Mutex::new(None),
        }
    }

    /// Drop pushes larger than `limit` bytes.
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.task.message_limit = limit;
        self
    }

    /// Start following the session. Restarts the loop if already running.
    pub fn start(&self) {
        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(self.task.clone().run(stopped));
        if let Some(old) = self.lock_running().replace(Running { stop, handle }) {
            old.stop();
        }
    }

    /// Stop following, close the open connection and cancel any pending
    /// reconnect. Calling it twice is a no-op.
    pub fn stop(&self) {
        if let Some(running) = self.lock_running().take() {
            running.stop();
            tracing::info!("Public viewer of {} stopped", self.task.session);
        }
        self.task.status.apply(Event::CloseRequested);
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session this viewer follows.
    pub fn session(&self) -> &SessionId {
        &self.task.session
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.task.status.status()
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.task.status.attempt()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.task.status.subscribe()
    }

    /// Latest projection received, if any.
    pub fn projection(&self) -> Option<PublicState> {
        self.task.projection.borrow().clone()
    }

    /// Watch the projection; it changes on every push.
    pub fn subscribe(&self) -> watch::Receiver<Option<PublicState>> {
        self.task.projection.subscribe()
    }
}

impl Drop for PublicViewer {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.stop();
        }
    }
}

impl ViewerTask {
    async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut actions = self.status.apply(Event::ConnectRequested);

        loop {
            let mut next = None;
            for action in actions {
                match action {
                    Action::Connect => next = self.follow(&mut stop).await,
                    Action::StartReconnectTimer { delay } => {
                        tracing::debug!("Reconnecting to {} in {:?}", self.session, delay);
                        tokio::select! {
                            biased;
                            _ = stop_requested(&mut stop) => return,
                            _ = tokio::time::sleep(delay) => next = Some(Event::ReconnectTimer),
                        }
                    }
                    _ => {}
                }
            }

            match next {
                Some(event) if !*stop.borrow() => actions = self.status.apply(event),
                _ => return,
            }
        }
    }

    /// Connect and consume pushes until the connection ends.
    ///
    /// Returns the event describing how it ended, or `None` once stopped.
    async fn follow(&self, stop: &mut watch::Receiver<bool>) -> Option<Event> {
        let connecting = self
            .signaling
            .connect(&self.session, Some(ConnectMetadata::public_viewer()));
        let connected = tokio::select! {
            biased;
            _ = stop_requested(stop) => return None,
            connected = connecting => connected,
        };
        let channel = match connected {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Public viewer failed to connect to {}: {}", self.session, e);
                return Some(Event::TransportError);
            }
        };

        self.status.apply(Event::Opened);
        tracing::info!("Public viewer connected to {}", self.session);

        loop {
            let received = tokio::select! {
                biased;
                _ = stop_requested(stop) => {
                    channel.close().await;
                    return None;
                }
                received = channel.recv() => received,
            };

            match received {
                Ok(Some(frame)) if frame.len() > self.message_limit => {
                    tracing::warn!(
                        "Dropping oversize push ({} bytes, limit {})",
                        frame.len(),
                        self.message_limit
                    );
                }
                Ok(Some(frame)) => match PublicState::from_json(&frame) {
                    Ok(state) => {
                        self.projection.send_replace(Some(state));
                    }
                    Err(e) => tracing::warn!("Dropping malformed push: {}", e),
                },
                Ok(None) => {
                    tracing::info!("Public connection to {} closed", self.session);
                    return Some(Event::Closed);
                }
                Err(e) => {
                    tracing::warn!("Public connection to {} failed: {}", self.session, e);
                    channel.close().await;
                    return Some(Event::TransportError);
                }
            }
        }
    }
}
