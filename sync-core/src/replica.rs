//! Local replica of the tournament state.
//!
//! Every process (host or director) holds one [`Replica`]. Actions are
//! applied through a pluggable [`Reducer`]; the replica only records where
//! each action came from so that synced actions are never forwarded again.

use sync_types::{Action, FullState};

/// Business logic that interprets actions.
///
/// Implementations live outside the replication layer (clock, seating,
/// payouts...). They must be fast and synchronous.
pub trait Reducer: Send + Sync + 'static {
    /// Apply `action` to `state` and return the new state.
    fn reduce(&self, state: FullState, action: &Action) -> FullState;
}

impl<F> Reducer for F
where
    F: Fn(FullState, &Action) -> FullState + Send + Sync + 'static,
{
    fn reduce(&self, state: FullState, action: &Action) -> FullState {
        self(state, action)
    }
}

/// Where an applied action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Dispatched by the local user.
    Local,
    /// Received from the network ("from-sync"). Never re-forwarded upstream.
    Sync,
}

/// A replica of the state plus the reducer that advances it.
#[derive(Debug)]
pub struct Replica<R> {
    state: FullState,
    reducer: R,
    version: u64,
}

impl<R: Reducer> Replica<R> {
    /// Create a replica seeded with `state`.
    pub fn new(state: FullState, reducer: R) -> Self {
        Self {
            state,
            reducer,
            version: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> &FullState {
        &self.state
    }

    /// Monotonic counter bumped by every apply and replace.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply one action. Returns true when the caller should forward it.
    pub fn apply(&mut self, action: &Action, origin: Origin) -> bool {
        let state = std::mem::take(&mut self.state);
        self.state = self.reducer.reduce(state, action);
        self.version += 1;
        origin == Origin::Local
    }

    /// Replace the replicated state wholesale with a received snapshot.
    ///
    /// This is a full replace, not a merge. Local print targets survive
    /// because they were never part of the snapshot.
    pub fn replace(&mut self, snapshot: FullState) {
        let print = std::mem::take(&mut self.state.print);
        self.state = FullState { print, ..snapshot };
        self.version += 1;
    }

    /// Snapshot of the current state with print targets stripped.
    pub fn snapshot(&self) -> FullState {
        self.state.snapshot()
    }
}
