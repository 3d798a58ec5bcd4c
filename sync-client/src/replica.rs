//! Replica shared between a role's tasks.

use std::sync::Arc;
use sync_core::{Origin, Reducer, Replica};
use sync_types::{Action, FullState};
use tokio::sync::{watch, Mutex};

/// A [`Replica`] behind a lock, with a watch channel of its version.
///
/// Each process holds one; it outlives role changes so that a device that
/// switches from host to director keeps rendering the same state until a
/// snapshot replaces it.
pub struct SharedReplica<R> {
    inner: Arc<Mutex<Replica<R>>>,
    version: Arc<watch::Sender<u64>>,
}

impl<R> Clone for SharedReplica<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            version: Arc::clone(&self.version),
        }
    }
}

impl<R: Reducer> SharedReplica<R> {
    /// Wrap a fresh replica seeded with `state`.
    pub fn new(state: FullState, reducer: R) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(Replica::new(state, reducer))),
            version: Arc::new(version),
        }
    }

    /// Run `f` with exclusive access, then publish the new version.
    ///
    /// Anything done inside `f` is ordered with respect to every other
    /// mutation of this replica.
    pub async fn with<T>(&self, f: impl FnOnce(&mut Replica<R>) -> T) -> T {
        let mut replica = self.inner.lock().await;
        let out = f(&mut replica);
        self.version.send_if_modified(|v| {
            let changed = *v != replica.version();
            *v = replica.version();
            changed
        });
        out
    }

    /// Apply one action. Returns true when it should be forwarded.
    pub async fn apply(&self, action: &Action, origin: Origin) -> bool {
        self.with(|r| r.apply(action, origin)).await
    }

    /// Replace the state wholesale with a received snapshot.
    pub async fn replace(&self, snapshot: FullState) {
        self.with(|r| r.replace(snapshot)).await
    }

    /// Clone of the current state, print targets included.
    pub async fn state(&self) -> FullState {
        self.inner.lock().await.state().clone()
    }

    /// Current state with print targets stripped.
    pub async fn snapshot(&self) -> FullState {
        self.inner.lock().await.snapshot()
    }

    /// Watch the replica version; it changes after every apply or replace.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl<R> std::fmt::Debug for SharedReplica<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedReplica")
            .field("version", &*self.version.borrow())
            .finish()
    }
}
