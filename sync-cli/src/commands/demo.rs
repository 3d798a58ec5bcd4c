//! In-process demo: one host, N directors and a public viewer over the
//! in-memory transport.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sync_client::{MemorySignaling, SharedReplica};
use sync_core::ConnectionStatus;
use sync_host::{HostConfig, RoleManager};
use sync_types::{Action, FullState, Player, PublicState, Tournament};
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

/// Reducer for the demo: advances the blind level and toggles the clock.
fn demo_reducer(mut state: FullState, action: &Action) -> FullState {
    let id = action
        .payload()
        .and_then(|p| p.get("tournamentId"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let Some(t) = state.tournament_mut(&id) else {
        return state;
    };

    match action.kind() {
        Some("NEXT_LEVEL") => {
            let level = t.field("level").and_then(Value::as_u64).unwrap_or(1);
            t.fields.insert("level".into(), json!(level + 1));
        }
        Some("TOGGLE_PAUSE") => {
            let paused = t.field("paused").and_then(Value::as_bool).unwrap_or(false);
            t.fields.insert("paused".into(), json!(!paused));
        }
        _ => {}
    }
    state
}

type DemoReducer = fn(FullState, &Action) -> FullState;

fn sample_state() -> FullState {
    let mut main = Tournament::new("t1");
    main.fields.insert("name".into(), json!("Friday Main Event"));
    main.fields.insert("level".into(), json!(1));

    let mut last_week = Tournament::new("t0");
    last_week.is_archived = true;
    last_week.fields.insert("name".into(), json!("Last Friday"));

    let mut ada = Player::new("p1");
    ada.fields.insert("name".into(), json!("Ada"));
    ada.notes = "tilts after bad beats".into();

    let mut bob = Player::new("p2");
    bob.fields.insert("name".into(), json!("Bob"));

    FullState {
        tournaments: vec![main, last_week],
        players: vec![ada, bob],
        ..FullState::default()
    }
}

fn device(signaling: &MemorySignaling, config: &HostConfig, state: FullState) -> RoleManager<DemoReducer> {
    RoleManager::new(
        Arc::new(signaling.clone()),
        SharedReplica::new(state, demo_reducer as DemoReducer),
        config.clone(),
    )
}

async fn wait_for<T>(rx: &mut watch::Receiver<T>, what: &str, done: impl FnMut(&T) -> bool) -> Result<()> {
    tokio::time::timeout(WAIT, rx.wait_for(done))
        .await
        .with_context(|| format!("Timed out waiting for {}", what))?
        .with_context(|| format!("Stopped while waiting for {}", what))?;
    Ok(())
}

/// Run the demo.
pub async fn run(config: Option<&Path>, directors: usize) -> Result<()> {
    if directors == 0 {
        bail!("--directors must be at least 1");
    }

    let config = match config {
        Some(path) => HostConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => HostConfig::default(),
    };

    println!("=== floor-sync demo ===");
    println!();

    let signaling = MemorySignaling::new();
    let host = device(&signaling, &config, sample_state());
    let session = host.create_session().await.context("Failed to host session")?;
    println!("Session: {}", session);

    let mut staff = Vec::with_capacity(directors);
    for _ in 0..directors {
        let director = device(&signaling, &config, FullState::default());
        director
            .join_session(session.clone())
            .await
            .context("Failed to join session")?;
        wait_for(&mut director.subscribe_status(), "director snapshot", |s| {
            *s == ConnectionStatus::Connected
        })
        .await?;
        staff.push(director);
    }

    let link = host.public_link().await.context("Host has no public link")?;
    println!("Public link: {}", link);
    let viewer = host.public_viewer(&link);
    let mut projection = viewer.subscribe();
    viewer.start();
    wait_for(&mut projection, "first projection", Option::is_some).await?;

    host.dispatch(Action::new("NEXT_LEVEL", json!({ "tournamentId": "t1" })))
        .await?;
    staff[0]
        .dispatch(Action::new("TOGGLE_PAUSE", json!({ "tournamentId": "t1" })))
        .await?;

    let settled = |p: &Option<PublicState>| {
        p.as_ref()
            .and_then(|p| p.tournaments.first())
            .and_then(|t| t.field("paused"))
            .is_some_and(|v| v == &json!(true))
    };
    wait_for(&mut projection, "projection update", settled).await?;

    println!();
    println!("Statuses:");
    println!("  host:       {}", host.status());
    for (i, director) in staff.iter().enumerate() {
        println!("  director {}: {}", i + 1, director.status());
    }
    println!("  viewer:     {}", viewer.status());

    if let Some(authority) = host.host_authority().await {
        let metrics = authority.metrics();
        println!();
        println!("Host:");
        println!(
            "  Actions applied:  {}",
            metrics.actions_applied.load(std::sync::atomic::Ordering::Relaxed)
        );
        println!(
            "  Actions relayed:  {}",
            metrics.actions_relayed.load(std::sync::atomic::Ordering::Relaxed)
        );
    }

    println!();
    println!("Public projection:");
    let public = viewer.projection().unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&public)?);

    viewer.stop();
    for director in &staff {
        director.close_session().await;
    }
    host.close_session().await;

    Ok(())
}
