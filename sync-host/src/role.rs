//! Role manager.
//!
//! Decides whether this process hosts a session or joins one as a
//! director, and drives (re)connection. The device that calls
//! [`RoleManager::create_session`] becomes host; every device that calls
//! [`RoleManager::join_session`] with that id becomes a director. There is
//! no host migration: if the host vanishes, directors report
//! `disconnected` or `error` until someone retries.
//!
//! The manager owns one [`SharedReplica`] for the life of the process, so
//! the state survives role changes until a snapshot replaces it.

use crate::authority::HostAuthority;
use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::protocol::serve;
use crate::server::HostEngine;
use std::sync::Arc;
use sync_client::{DirectorClient, Listener, PublicViewer, SharedReplica, Signaling, StatusCell};
use sync_core::{Action as LifecycleAction, ConnectionStatus, Event, Origin, PublicLink, Reducer, RetryPolicy};
use sync_types::{Action, FullState, SessionId};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Role this process plays in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the authoritative state and accepts connections.
    Host,
    /// Joined someone else's session.
    Director,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Director => f.write_str("director"),
        }
    }
}

struct HostRole {
    session: SessionId,
    authority: Arc<dyn HostAuthority>,
    listener: Arc<dyn Listener>,
    accept_task: JoinHandle<()>,
}

impl Drop for HostRole {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

enum Active<R> {
    Idle,
    Host(HostRole),
    Director {
        session: SessionId,
        client: Arc<DirectorClient<R>>,
    },
}

struct Inner<R> {
    active: Active<R>,
    last: Option<(Role, SessionId)>,
}

/// Entry point for hosting or joining a session.
pub struct RoleManager<R> {
    signaling: Arc<dyn Signaling>,
    replica: SharedReplica<R>,
    status: StatusCell,
    config: HostConfig,
    inner: Mutex<Inner<R>>,
}

impl<R: Reducer> RoleManager<R> {
    /// Create an idle manager.
    pub fn new(signaling: Arc<dyn Signaling>, replica: SharedReplica<R>, config: HostConfig) -> Self {
        Self {
            signaling,
            replica,
            status: StatusCell::new(RetryPolicy::Manual),
            config,
            inner: Mutex::new(Inner {
                active: Active::Idle,
                last: None,
            }),
        }
    }

    /// Generate a session id and host it.
    ///
    /// If binding fails the id is still remembered, so
    /// [`retry_connection`](Self::retry_connection) binds the same one.
    pub async fn create_session(&self) -> Result<SessionId> {
        let session = SessionId::generate()?;
        self.host(session.clone()).await?;
        Ok(session)
    }

    async fn host(&self, session: SessionId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.last = Some((Role::Host, session.clone()));

        for action in self.status.apply(Event::ConnectRequested) {
            match action {
                LifecycleAction::TearDown => tear_down(&mut inner.active).await,
                LifecycleAction::Connect => {
                    inner.active = Active::Host(self.bind(&session).await?);
                    self.status.apply(Event::Opened);
                    tracing::info!("Hosting session {}", session);
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn bind(&self, session: &SessionId) -> Result<HostRole> {
        let listener: Arc<dyn Listener> = match self.signaling.listen(session).await {
            Ok(listener) => Arc::from(listener),
            Err(e) => {
                tracing::warn!("Failed to bind session {}: {}", session, e);
                self.status.apply(Event::TransportError);
                return Err(e.into());
            }
        };

        let engine = Arc::new(HostEngine::new(self.replica.clone(), self.config.host.clone()));
        let accept_task = tokio::spawn(accept_until_closed(
            Arc::clone(&engine),
            Arc::clone(&listener),
            self.status.clone(),
        ));

        Ok(HostRole {
            session: session.clone(),
            authority: engine,
            listener,
            accept_task,
        })
    }

    /// Join `session` as a director.
    ///
    /// The status turns `connected` once the host's snapshot arrives.
    pub async fn join_session(&self, session: SessionId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.last = Some((Role::Director, session.clone()));
        tear_down(&mut inner.active).await;

        let client = Arc::new(
            DirectorClient::new(
                Arc::clone(&self.signaling),
                self.replica.clone(),
                self.status.clone(),
            )
            .with_message_limit(self.config.host.max_message_bytes),
        );
        inner.active = Active::Director {
            session: session.clone(),
            client: Arc::clone(&client),
        };

        client.connect(&session).await?;
        Ok(())
    }

    /// Tear down every connection, reset the status and forget the
    /// session. Calling it twice is a no-op.
    pub async fn close_session(&self) {
        let mut inner = self.inner.lock().await;
        tear_down(&mut inner.active).await;
        inner.last = None;
        self.status.apply(Event::CloseRequested);
    }

    /// Host or join the last session again, in the same role.
    pub async fn retry_connection(&self) -> Result<()> {
        let last = self.inner.lock().await.last.clone();
        if let Some((role, session)) = &last {
            tracing::info!("Retrying session {} as {}", session, role);
        }
        match last {
            Some((Role::Host, session)) => self.host(session).await,
            Some((Role::Director, session)) => self.join_session(session).await,
            None => Err(HostError::NoSession),
        }
    }

    /// Apply a user action in whatever role is active.
    ///
    /// Hosts relay it to every director; directors forward it to the host
    /// if connected. Without a session the action only changes the local
    /// replica.
    pub async fn dispatch(&self, action: Action) -> Result<()> {
        enum Target<R> {
            Host(Arc<dyn HostAuthority>),
            Director(Arc<DirectorClient<R>>),
            Local,
        }

        let target = match &self.inner.lock().await.active {
            Active::Host(host) => Target::Host(Arc::clone(&host.authority)),
            Active::Director { client, .. } => Target::Director(Arc::clone(client)),
            Active::Idle => Target::Local,
        };

        match target {
            Target::Host(authority) => authority.dispatch(action).await,
            Target::Director(client) => {
                client.dispatch(action).await?;
                Ok(())
            }
            Target::Local => {
                self.replica.apply(&action, Origin::Local).await;
                Ok(())
            }
        }
    }

    /// Replace the state wholesale, e.g. after an import.
    ///
    /// Directors cannot do this; their state belongs to the host.
    pub async fn load_state(&self, state: FullState) -> Result<()> {
        let authority = match &self.inner.lock().await.active {
            Active::Host(host) => Some(Arc::clone(&host.authority)),
            Active::Director { .. } => return Err(HostError::WrongRole { expected: "host" }),
            Active::Idle => None,
        };

        match authority {
            Some(authority) => authority.load_state(state).await,
            None => {
                self.replica.replace(state).await;
                Ok(())
            }
        }
    }

    /// Build a public viewer for `link` using the configured backoff.
    pub fn public_viewer(&self, link: &PublicLink) -> PublicViewer {
        PublicViewer::new(Arc::clone(&self.signaling), link, self.config.viewer.backoff())
            .with_message_limit(self.config.host.max_message_bytes)
    }

    /// Current role, if any.
    pub async fn role(&self) -> Option<Role> {
        match self.inner.lock().await.active {
            Active::Idle => None,
            Active::Host(_) => Some(Role::Host),
            Active::Director { .. } => Some(Role::Director),
        }
    }

    /// Session of the active role.
    pub async fn session(&self) -> Option<SessionId> {
        match &self.inner.lock().await.active {
            Active::Idle => None,
            Active::Host(host) => Some(host.session.clone()),
            Active::Director { session, .. } => Some(session.clone()),
        }
    }

    /// Public-viewer link for the hosted session.
    pub async fn public_link(&self) -> Option<PublicLink> {
        match &self.inner.lock().await.active {
            Active::Host(host) => Some(PublicLink::new(host.session.clone())),
            _ => None,
        }
    }

    /// The host authority, while hosting.
    pub async fn host_authority(&self) -> Option<Arc<dyn HostAuthority>> {
        match &self.inner.lock().await.active {
            Active::Host(host) => Some(Arc::clone(&host.authority)),
            _ => None,
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.status()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// The process-wide replica.
    pub fn replica(&self) -> &SharedReplica<R> {
        &self.replica
    }
}

async fn accept_until_closed<R: Reducer>(
    engine: Arc<HostEngine<R>>,
    listener: Arc<dyn Listener>,
    status: StatusCell,
) {
    if serve(Arc::clone(&engine), Arc::clone(&listener)).await.is_ok() {
        return;
    }

    // torn down before the status turns error
    listener.close().await;
    engine.shutdown().await;
    tracing::warn!("Listener failed, host connections closed");
    status.apply(Event::TransportError);
}

async fn tear_down<R: Reducer>(active: &mut Active<R>) {
    match std::mem::replace(active, Active::Idle) {
        Active::Idle => {}
        Active::Host(host) => {
            host.accept_task.abort();
            host.listener.close().await;
            host.authority.shutdown().await;
            tracing::info!("Stopped hosting {}", host.session);
        }
        Active::Director { session, client } => {
            client.disconnect().await;
            tracing::info!("Left session {}", session);
        }
    }
}
