//! End-to-end replication between a host, directors and public viewers,
//! all wired through in-memory signaling.

use floor_sync_host::{serve, HostConfig, HostEngine, HostLimits, RoleManager};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use sync_client::{Channel, Listener, MemorySignaling, SharedReplica, Signaling};
use sync_core::{Backoff, ConnectionStatus, PublicLink};
use sync_types::{Action, ConnectMetadata, FullState, Player, PublicState, SessionId, SyncMessage, Tournament};
use tokio::sync::watch;
use tokio::time::timeout;

type LevelFn = fn(FullState, &Action) -> FullState;

fn next_level(mut state: FullState, action: &Action) -> FullState {
    if action.kind() != Some("NEXT_LEVEL") {
        return state;
    }
    let id = action
        .payload()
        .and_then(|p| p.get("tournamentId"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    if let Some(t) = state.tournament_mut(&id) {
        let level = t.field("level").and_then(Value::as_u64).unwrap_or(1);
        t.fields.insert("level".into(), json!(level + 1));
    }
    state
}

fn next_level_action(id: &str) -> Action {
    Action::new("NEXT_LEVEL", json!({ "tournamentId": id }))
}

fn level(state: &FullState, id: &str) -> Option<u64> {
    state.tournament(id)?.field("level")?.as_u64()
}

fn floor_state() -> FullState {
    let mut t1 = Tournament::new("t1");
    t1.fields.insert("level".into(), json!(1));
    let mut archived = Tournament::new("t0");
    archived.is_archived = true;
    let mut player = Player::new("p1");
    player.notes = "slow roller".into();

    FullState {
        tournaments: vec![t1, archived],
        players: vec![player],
        ..FullState::default()
    }
}

fn session() -> SessionId {
    SessionId::parse("ab12cd34").unwrap()
}

struct Host {
    engine: Arc<HostEngine<LevelFn>>,
    listener: Arc<dyn Listener>,
}

impl Host {
    async fn start(signaling: &MemorySignaling, state: FullState) -> Self {
        let listener: Arc<dyn Listener> = Arc::from(signaling.listen(&session()).await.unwrap());
        let engine = Arc::new(HostEngine::new(
            SharedReplica::new(state, next_level as LevelFn),
            HostLimits::default(),
        ));
        tokio::spawn(serve(Arc::clone(&engine), Arc::clone(&listener)));
        Self { engine, listener }
    }

    async fn stop(&self) {
        self.listener.close().await;
        self.engine.shutdown().await;
    }
}

async fn recv(channel: &Arc<dyn Channel>) -> String {
    timeout(Duration::from_secs(5), channel.recv())
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
        .expect("channel closed")
}

async fn raw_director(signaling: &MemorySignaling) -> Arc<dyn Channel> {
    let channel = signaling.connect(&session(), None).await.unwrap();
    let first = SyncMessage::from_json(&recv(&channel).await).unwrap();
    assert!(matches!(first, SyncMessage::FullStateSync(_)));
    channel
}

async fn wait_for<T>(rx: &mut watch::Receiver<T>, mut done: impl FnMut(&T) -> bool) {
    timeout(Duration::from_secs(5), rx.wait_for(|v| done(v)))
        .await
        .expect("timed out waiting for watch value")
        .unwrap();
}

// ===========================================
// Director Tests
// ===========================================

#[tokio::test]
async fn director_gets_snapshot_then_relayed_actions() {
    let signaling = MemorySignaling::new();
    let host = Host::start(&signaling, floor_state()).await;

    let channel = signaling.connect(&session(), None).await.unwrap();
    match SyncMessage::from_json(&recv(&channel).await).unwrap() {
        SyncMessage::FullStateSync(state) => {
            assert_eq!(state.tournaments, floor_state().tournaments);
            assert_eq!(state.player("p1").unwrap().notes, "slow roller");
        }
        other => panic!("expected FULL_STATE_SYNC, got {}", other.type_name()),
    }

    host.engine.dispatch(next_level_action("t1")).await.unwrap();
    match SyncMessage::from_json(&recv(&channel).await).unwrap() {
        SyncMessage::Action(action) => assert_eq!(action, next_level_action("t1")),
        other => panic!("expected ACTION, got {}", other.type_name()),
    }
    assert_eq!(level(&host.engine.replica().state().await, "t1"), Some(2));
}

#[tokio::test]
async fn director_manager_follows_host_manager() {
    let signaling = MemorySignaling::new();
    let host = RoleManager::new(
        Arc::new(signaling.clone()),
        SharedReplica::new(floor_state(), next_level as LevelFn),
        HostConfig::default(),
    );
    let director = RoleManager::new(
        Arc::new(signaling.clone()),
        SharedReplica::new(FullState::default(), next_level as LevelFn),
        HostConfig::default(),
    );

    let session = host.create_session().await.unwrap();
    director.join_session(session).await.unwrap();
    wait_for(&mut director.subscribe_status(), |s| *s == ConnectionStatus::Connected).await;
    assert_eq!(director.replica().state().await, floor_state());

    let mut version = director.replica().subscribe();
    let seen = *version.borrow();
    host.dispatch(next_level_action("t1")).await.unwrap();
    wait_for(&mut version, |v| *v > seen).await;
    assert_eq!(level(&director.replica().state().await, "t1"), Some(2));

    // forwarded to the host, applied there, not echoed back
    let mut host_version = host.replica().subscribe();
    let host_seen = *host_version.borrow();
    director.dispatch(next_level_action("t1")).await.unwrap();
    wait_for(&mut host_version, |v| *v > host_seen).await;
    assert_eq!(level(&host.replica().state().await, "t1"), Some(3));

    let seen = *version.borrow();
    host.dispatch(next_level_action("t1")).await.unwrap();
    wait_for(&mut version, |v| *v > seen).await;
    assert_eq!(level(&director.replica().state().await, "t1"), Some(4));
    assert_eq!(level(&host.replica().state().await, "t1"), Some(4));
}

#[tokio::test]
async fn director_action_fans_out_without_echo() {
    let signaling = MemorySignaling::new();
    let host = Host::start(&signaling, floor_state()).await;

    let d1 = raw_director(&signaling).await;
    let d2 = raw_director(&signaling).await;
    let d3 = raw_director(&signaling).await;

    let action = next_level_action("t1");
    d1.send(&SyncMessage::Action(action.clone()).to_json().unwrap())
        .await
        .unwrap();

    for peer in [&d2, &d3] {
        assert_eq!(
            SyncMessage::from_json(&recv(peer).await).unwrap(),
            SyncMessage::Action(action.clone())
        );
    }

    // the next thing d1 hears is the marker, not its own action
    let marker = Action::new("PAUSE", json!({}));
    host.engine.dispatch(marker.clone()).await.unwrap();
    assert_eq!(
        SyncMessage::from_json(&recv(&d1).await).unwrap(),
        SyncMessage::Action(marker)
    );
    assert_eq!(host.engine.metrics().actions_applied.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn malformed_director_frames_are_dropped() {
    let signaling = MemorySignaling::new();
    let host = Host::start(&signaling, floor_state()).await;

    let d1 = raw_director(&signaling).await;
    let d2 = raw_director(&signaling).await;

    d1.send("{ not json").await.unwrap();
    d1.send(r#"{"type":"BOGUS","payload":{}}"#).await.unwrap();
    d1.send(&SyncMessage::Action(next_level_action("t1")).to_json().unwrap())
        .await
        .unwrap();

    assert_eq!(
        SyncMessage::from_json(&recv(&d2).await).unwrap(),
        SyncMessage::Action(next_level_action("t1"))
    );
    assert_eq!(host.engine.metrics().malformed_frames.load(Ordering::Relaxed), 2);
    assert_eq!(host.engine.metrics().actions_applied.load(Ordering::Relaxed), 1);
    assert!(d1.is_open());
}

// ===========================================
// Isolation Tests
// ===========================================

#[tokio::test]
async fn viewers_only_ever_see_public_state() {
    let signaling = MemorySignaling::new();
    let host = Host::start(&signaling, floor_state()).await;

    let viewer = signaling
        .connect(&session(), Some(ConnectMetadata::public_viewer()))
        .await
        .unwrap();
    let director = raw_director(&signaling).await;

    host.engine.dispatch(next_level_action("t1")).await.unwrap();

    for _ in 0..2 {
        let frame: Value = serde_json::from_str(&recv(&viewer).await).unwrap();
        assert!(frame.get("type").is_none(), "viewer got an envelope: {frame}");
        let public: PublicState = serde_json::from_value(frame).unwrap();
        assert_eq!(public.tournaments.len(), 1);
        assert_eq!(public.tournaments[0].id, "t1");
        assert!(public.players.iter().all(|p| p.notes.is_empty()));
    }

    let frame: Value = serde_json::from_str(&recv(&director).await).unwrap();
    assert_eq!(frame["type"], "ACTION");
}

// ===========================================
// Teardown Tests
// ===========================================

#[tokio::test]
async fn closing_the_host_twice_leaves_no_connections() {
    let signaling = MemorySignaling::new();
    let host = RoleManager::new(
        Arc::new(signaling.clone()),
        SharedReplica::new(floor_state(), next_level as LevelFn),
        HostConfig::default(),
    );
    let session = host.create_session().await.unwrap();

    let director = RoleManager::new(
        Arc::new(signaling.clone()),
        SharedReplica::new(FullState::default(), next_level as LevelFn),
        HostConfig::default(),
    );
    director.join_session(session.clone()).await.unwrap();
    let mut director_status = director.subscribe_status();
    wait_for(&mut director_status, |s| *s == ConnectionStatus::Connected).await;

    let authority = host.host_authority().await.unwrap();
    host.close_session().await;
    host.close_session().await;

    assert_eq!(authority.connections(sync_types::PeerRole::Director), 0);
    assert!(!signaling.is_bound(&session));
    assert_eq!(host.status(), ConnectionStatus::Disconnected);
    wait_for(&mut director_status, |s| *s == ConnectionStatus::Disconnected).await;
}

// ===========================================
// Public Viewer Tests
// ===========================================

#[tokio::test(start_paused = true)]
async fn viewer_reconnects_after_host_restart() {
    let signaling = MemorySignaling::new();
    let host = Host::start(&signaling, floor_state()).await;

    let viewer = sync_client::PublicViewer::new(
        Arc::new(signaling.clone()),
        &PublicLink::new(session()),
        Backoff::default(),
    );
    let mut projection = viewer.subscribe();
    viewer.start();
    wait_for(&mut projection, |p| p.is_some()).await;

    host.stop().await;
    wait_for(&mut viewer.subscribe_status(), |s| *s != ConnectionStatus::Connected).await;

    let mut restarted = floor_state();
    restarted.tournaments.push(Tournament::new("t2"));
    let _host = Host::start(&signaling, restarted).await;

    wait_for(&mut projection, |p| {
        p.as_ref().is_some_and(|p| p.tournaments.iter().any(|t| t.id == "t2"))
    })
    .await;
    assert_eq!(viewer.status(), ConnectionStatus::Connected);
    assert_eq!(viewer.attempt(), 0);
}
