//! Director-client replication engine.
//!
//! A director holds one connection to the host. It sends nothing until the
//! host pushes a `FULL_STATE_SYNC`, which replaces the local replica
//! wholesale. After that:
//!
//! ```text
//! local dispatch ─► replica.apply(Local) ─► ACTION ─► host
//! host ─► ACTION ─► replica.apply(Sync)            (never forwarded again)
//! host ─► FULL_STATE_SYNC ─► replica.replace
//! ```
//!
//! Lost connections are not retried automatically; the role manager
//! decides when to reconnect.

use std::sync::Arc;
use sync_core::{Action as LifecycleAction, ConnectionStatus, Event, Origin, Reducer};
use sync_types::{Action, SessionId, SyncMessage};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::replica::SharedReplica;
use crate::status::{stop_requested, StatusCell};
use crate::transport::{Channel, Signaling, MAX_MESSAGE_SIZE};

struct HostLink {
    session: SessionId,
    channel: Arc<dyn Channel>,
    stop: watch::Sender<bool>,
    reader: JoinHandle<()>,
}

impl Drop for HostLink {
    // the reader closes the channel on its way out
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

/// Replication engine of a director device.
pub struct DirectorClient<R> {
    signaling: Arc<dyn Signaling>,
    replica: SharedReplica<R>,
    status: StatusCell,
    link: Mutex<Option<HostLink>>,
    message_limit: usize,
}

impl<R: Reducer> DirectorClient<R> {
    /// Create a director that applies to `replica` and reports on `status`.
    pub fn new(signaling: Arc<dyn Signaling>, replica: SharedReplica<R>, status: StatusCell) -> Self {
        Self {
            signaling,
            replica,
            status,
            link: Mutex::new(None),
            message_limit: MAX_MESSAGE_SIZE,
        }
    }

    /// Drop inbound frames larger than `limit` bytes.
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    /// Join `session`, replacing any connection held before.
    ///
    /// Returns once the channel is open; the status turns `connected` when
    /// the host's first snapshot arrives.
    pub async fn connect(&self, session: &SessionId) -> Result<()> {
        for action in self.status.apply(Event::ConnectRequested) {
            match action {
                LifecycleAction::TearDown => self.tear_down().await,
                LifecycleAction::Connect => self.open(session).await?,
                _ => {}
            }
        }
        Ok(())
    }

    async fn open(&self, session: &SessionId) -> Result<()> {
        tracing::info!("Joining session {} as director", session);

        let channel = match self.signaling.connect(session, None).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Failed to reach host of {}: {}", session, e);
                self.status.apply(Event::TransportError);
                return Err(e.into());
            }
        };

        let (stop, stopped) = watch::channel(false);
        let reader = tokio::spawn(read_from_host(
            Arc::clone(&channel),
            self.replica.clone(),
            self.status.clone(),
            self.message_limit,
            stopped,
        ));

        *self.link.lock().await = Some(HostLink {
            session: session.clone(),
            channel,
            stop,
            reader,
        });
        Ok(())
    }

    /// Apply a user action locally and forward it to the host.
    ///
    /// Returns whether the action went out. When the host connection is not
    /// open the action stays local; there is no outbound queue.
    pub async fn dispatch(&self, action: Action) -> Result<bool> {
        if !self.replica.apply(&action, Origin::Local).await {
            return Ok(false);
        }

        let channel = self
            .link
            .lock()
            .await
            .as_ref()
            .map(|link| Arc::clone(&link.channel));

        let Some(channel) = channel.filter(|c| c.is_open()) else {
            tracing::debug!("Not connected, {} applied locally only", action.kind().unwrap_or("action"));
            return Ok(false);
        };

        let text = SyncMessage::Action(action).to_json()?;
        if let Err(e) = channel.send(&text).await {
            tracing::warn!("Failed to forward action to host: {}", e);
            return Ok(false);
        }
        Ok(true)
    }

    /// Leave the session. Calling it twice is a no-op.
    pub async fn close(&self) {
        for action in self.status.apply(Event::CloseRequested) {
            if action == LifecycleAction::TearDown {
                self.tear_down().await;
            }
        }
    }

    /// Drop the host connection, leaving the status to the caller.
    pub async fn disconnect(&self) {
        self.tear_down().await;
    }

    async fn tear_down(&self) {
        let link = self.link.lock().await.take();
        if let Some(mut link) = link {
            link.stop.send_replace(true);
            link.channel.close().await;
            // no status updates from the old reader after this
            let _ = (&mut link.reader).await;
            tracing::debug!("Host connection for {} torn down", link.session);
        }
    }

    /// Session of the current or last connection.
    pub async fn session(&self) -> Option<SessionId> {
        self.link.lock().await.as_ref().map(|l| l.session.clone())
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.status()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// The local replica.
    pub fn replica(&self) -> &SharedReplica<R> {
        &self.replica
    }
}

async fn read_from_host<R: Reducer>(
    channel: Arc<dyn Channel>,
    replica: SharedReplica<R>,
    status: StatusCell,
    limit: usize,
    mut stop: watch::Receiver<bool>,
) {
    let mut synced = false;

    loop {
        let received = tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => {
                channel.close().await;
                return;
            }
            received = channel.recv() => received,
        };

        let frame = match received {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("Host closed the connection");
                status.apply(Event::Closed);
                return;
            }
            Err(e) => {
                tracing::warn!("Host connection failed: {}", e);
                channel.close().await;
                status.apply(Event::TransportError);
                return;
            }
        };

        match SyncMessage::from_json_limited(&frame, limit) {
            Ok(SyncMessage::FullStateSync(state)) => {
                replica.replace(*state).await;
                if !synced {
                    synced = true;
                    status.apply(Event::Opened);
                    tracing::info!("Received initial state from host");
                } else {
                    tracing::debug!("State replaced by host snapshot");
                }
            }
            Ok(SyncMessage::Action(action)) => {
                tracing::debug!("Applying relayed {}", action.kind().unwrap_or("action"));
                replica.apply(&action, Origin::Sync).await;
            }
            Err(e) => tracing::warn!("Dropping malformed frame from host: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Incoming, Listener, MemorySignaling};
    use serde_json::json;
    use sync_core::RetryPolicy;
    use sync_types::{FullState, Tournament};

    fn next_level(mut state: FullState, action: &Action) -> FullState {
        if action.kind() == Some("NEXT_LEVEL") {
            if let Some(t) = state.tournament_mut("t1") {
                let level = t.field("level").and_then(|v| v.as_u64()).unwrap_or(1);
                t.fields.insert("level".into(), json!(level + 1));
            }
        }
        state
    }

    type LevelFn = fn(FullState, &Action) -> FullState;

    struct Harness {
        signaling: MemorySignaling,
        listener: Box<dyn Listener>,
        session: SessionId,
        director: DirectorClient<LevelFn>,
    }

    async fn harness() -> Harness {
        let signaling = MemorySignaling::new();
        let session = SessionId::parse("ab12cd34").unwrap();
        let listener = signaling.listen(&session).await.unwrap();

        let replica = SharedReplica::new(FullState::default(), next_level as LevelFn);
        let director = DirectorClient::new(
            Arc::new(signaling.clone()),
            replica,
            StatusCell::new(RetryPolicy::Manual),
        );

        Harness {
            signaling,
            listener,
            session,
            director,
        }
    }

    fn host_state() -> FullState {
        FullState {
            tournaments: vec![Tournament::new("t1")],
            ..FullState::default()
        }
    }

    async fn join(h: &Harness) -> Incoming {
        h.director.connect(&h.session).await.unwrap();
        h.listener.accept().await.unwrap().unwrap()
    }

    async fn push_snapshot(host: &Incoming, state: &FullState) {
        let text = SyncMessage::full_state_sync(state).to_json().unwrap();
        host.channel.send(&text).await.unwrap();
    }

    async fn wait_status(director: &DirectorClient<LevelFn>, status: ConnectionStatus) {
        let mut rx = director.subscribe_status();
        rx.wait_for(|s| *s == status).await.unwrap();
    }

    // ===========================================
    // Connect / Snapshot Tests
    // ===========================================

    #[tokio::test]
    async fn connects_only_after_first_snapshot() {
        let h = harness().await;
        let host = join(&h).await;

        assert!(host.metadata.is_none());
        assert_eq!(h.director.status(), ConnectionStatus::Connecting);

        push_snapshot(&host, &host_state()).await;
        wait_status(&h.director, ConnectionStatus::Connected).await;

        let state = h.director.replica().state().await;
        assert_eq!(state.tournaments, host_state().tournaments);
    }

    #[tokio::test]
    async fn snapshot_replaces_local_state() {
        let h = harness().await;
        h.director
            .replica()
            .replace(FullState {
                tournaments: vec![Tournament::new("stale")],
                ..FullState::default()
            })
            .await;

        let host = join(&h).await;
        push_snapshot(&host, &host_state()).await;
        wait_status(&h.director, ConnectionStatus::Connected).await;

        let state = h.director.replica().state().await;
        assert!(state.tournament("stale").is_none());
        assert!(state.tournament("t1").is_some());
    }

    #[tokio::test]
    async fn connect_failure_sets_error() {
        let h = harness().await;
        h.signaling.fail_next_connect("network unreachable");

        let result = h.director.connect(&h.session).await;
        assert!(result.is_err());
        assert_eq!(h.director.status(), ConnectionStatus::Error);
    }

    // ===========================================
    // Action Flow Tests
    // ===========================================

    #[tokio::test]
    async fn relayed_actions_apply_without_echo() {
        let h = harness().await;
        let host = join(&h).await;
        push_snapshot(&host, &host_state()).await;
        wait_status(&h.director, ConnectionStatus::Connected).await;

        let mut version = h.director.replica().subscribe();
        version.borrow_and_update();

        let relayed = SyncMessage::Action(Action::new("NEXT_LEVEL", json!({ "tournamentId": "t1" })));
        host.channel.send(&relayed.to_json().unwrap()).await.unwrap();
        version.changed().await.unwrap();

        let state = h.director.replica().state().await;
        assert_eq!(state.tournament("t1").unwrap().field("level"), Some(&json!(2)));

        // the first frame the host sees is the next local action, not an echo
        let local = Action::new("PAUSE", json!({}));
        assert!(h.director.dispatch(local.clone()).await.unwrap());
        let frame = host.channel.recv().await.unwrap().unwrap();
        assert_eq!(SyncMessage::from_json(&frame).unwrap(), SyncMessage::Action(local));
    }

    #[tokio::test]
    async fn dispatch_while_disconnected_stays_local() {
        let h = harness().await;
        h.director.replica().replace(host_state()).await;

        let sent = h
            .director
            .dispatch(Action::new("NEXT_LEVEL", json!({ "tournamentId": "t1" })))
            .await
            .unwrap();

        assert!(!sent);
        let state = h.director.replica().state().await;
        assert_eq!(state.tournament("t1").unwrap().field("level"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let h = harness().await;
        let host = join(&h).await;
        push_snapshot(&host, &host_state()).await;
        wait_status(&h.director, ConnectionStatus::Connected).await;

        let mut version = h.director.replica().subscribe();
        let before = *version.borrow_and_update();

        host.channel.send("not json").await.unwrap();
        host.channel.send(r#"{"type":"HELLO","payload":{}}"#).await.unwrap();
        let relayed = SyncMessage::Action(Action::new("NEXT_LEVEL", json!({})));
        host.channel.send(&relayed.to_json().unwrap()).await.unwrap();

        version.changed().await.unwrap();
        assert_eq!(*version.borrow(), before + 1);
        assert_eq!(h.director.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn oversize_frames_are_dropped() {
        let h = harness().await;
        let director = DirectorClient::new(
            Arc::new(h.signaling.clone()),
            SharedReplica::new(FullState::default(), next_level as LevelFn),
            StatusCell::new(RetryPolicy::Manual),
        )
        .with_message_limit(256);

        director.connect(&h.session).await.unwrap();
        let host = h.listener.accept().await.unwrap().unwrap();

        let big = FullState {
            tournaments: (0..20).map(|i| Tournament::new(format!("t{i}"))).collect(),
            ..FullState::default()
        };
        push_snapshot(&host, &big).await;
        push_snapshot(&host, &FullState::default()).await;
        wait_status(&director, ConnectionStatus::Connected).await;

        assert!(director.replica().state().await.tournaments.is_empty());
    }

    // ===========================================
    // Close Tests
    // ===========================================

    #[tokio::test]
    async fn host_close_sets_disconnected() {
        let h = harness().await;
        let host = join(&h).await;
        push_snapshot(&host, &host_state()).await;
        wait_status(&h.director, ConnectionStatus::Connected).await;

        host.channel.close().await;
        wait_status(&h.director, ConnectionStatus::Disconnected).await;
    }

    #[tokio::test]
    async fn close_twice_is_noop() {
        let h = harness().await;
        let host = join(&h).await;

        h.director.close().await;
        h.director.close().await;

        assert_eq!(h.director.status(), ConnectionStatus::Disconnected);
        assert!(!host.channel.is_open());
        assert!(h.director.session().await.is_none());
    }

    #[tokio::test]
    async fn reconnect_tears_down_previous_channel() {
        let h = harness().await;
        let first = join(&h).await;
        let second = join(&h).await;

        assert!(!first.channel.is_open());
        assert!(second.channel.is_open());
    }

    #[tokio::test]
    async fn dropping_the_director_closes_the_host_channel() {
        let h = harness().await;
        let host = join(&h).await;
        push_snapshot(&host, &host_state()).await;
        wait_status(&h.director, ConnectionStatus::Connected).await;

        drop(h.director);

        let end = tokio::time::timeout(std::time::Duration::from_secs(5), host.channel.recv())
            .await
            .expect("host side never saw the close");
        assert_eq!(end.unwrap(), None);
        assert!(!host.channel.is_open());
    }

    #[tokio::test]
    async fn disconnect_leaves_status_alone() {
        let h = harness().await;
        let host = join(&h).await;
        push_snapshot(&host, &host_state()).await;
        wait_status(&h.director, ConnectionStatus::Connected).await;

        h.director.disconnect().await;

        assert_eq!(host.channel.recv().await.unwrap(), None);
        assert_eq!(h.director.status(), ConnectionStatus::Connected);
    }
}
