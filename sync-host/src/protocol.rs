//! Accept loop for a hosted session.

use crate::server::HostEngine;
use std::sync::Arc;
use sync_client::{Listener, TransportError};
use sync_core::Reducer;

/// Accept connections on `listener` until it closes.
///
/// Each connection is handed to the engine, which spawns its own session
/// task, so a slow peer never blocks the loop. Returns the listener error
/// that ended the loop, if any.
pub async fn serve<R: Reducer>(
    engine: Arc<HostEngine<R>>,
    listener: Arc<dyn Listener>,
) -> Result<(), TransportError> {
    loop {
        match listener.accept().await {
            Ok(Some(incoming)) => {
                if let Err(e) = engine.accept(incoming).await {
                    tracing::warn!("Rejected connection: {}", e);
                }
            }
            Ok(None) => {
                tracing::debug!("Listener closed, accept loop done");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Listener failed: {}", e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostLimits;
    use sync_client::{Channel, MemorySignaling, SharedReplica, Signaling};
    use sync_types::{Action, FullState, PeerRole, SessionId};

    type Noop = fn(FullState, &Action) -> FullState;

    fn noop(state: FullState, _: &Action) -> FullState {
        state
    }

    #[tokio::test]
    async fn serves_until_listener_closes() {
        let signaling = MemorySignaling::new();
        let session = SessionId::parse("ab12cd34").unwrap();
        let listener: Arc<dyn Listener> = Arc::from(signaling.listen(&session).await.unwrap());

        let engine = Arc::new(HostEngine::new(
            SharedReplica::new(FullState::default(), noop as Noop),
            HostLimits::default(),
        ));
        let task = tokio::spawn(serve(Arc::clone(&engine), Arc::clone(&listener)));

        let director = signaling.connect(&session, None).await.unwrap();
        director.recv().await.unwrap();
        assert_eq!(engine.registry().count(PeerRole::Director), 1);

        listener.close().await;
        assert!(task.await.unwrap().is_ok());
    }
}
