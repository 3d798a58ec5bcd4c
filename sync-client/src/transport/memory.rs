//! In-process transport.
//!
//! Pairs endpoints by session id inside one process. Cloning a
//! [`MemorySignaling`] shares its rendezvous table, so a host and its
//! directors can be wired together in a single test.

use super::{Channel, Incoming, Listener, Signaling, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_types::{ConnectMetadata, PeerId, SessionId};
use tokio::sync::{mpsc, watch};

/// In-memory signaling service with failure injection.
#[derive(Debug, Default, Clone)]
pub struct MemorySignaling {
    inner: Arc<Mutex<SignalingInner>>,
}

#[derive(Debug, Default)]
struct SignalingInner {
    listeners: HashMap<SessionId, Binding>,
    next_binding: u64,
    connect_attempts: u64,
    fail_next_connect: Option<String>,
    fail_next_listen: Option<String>,
    fail_next_accept: Option<String>,
}

#[derive(Debug)]
struct Binding {
    id: u64,
    tx: mpsc::UnboundedSender<Incoming>,
}

fn lock(inner: &Mutex<SignalingInner>) -> MutexGuard<'_, SignalingInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemorySignaling {
    /// Create an empty rendezvous table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next `connect()` to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        lock(&self.inner).fail_next_connect = Some(error.to_string());
    }

    /// Cause the next `listen()` to fail with the given error.
    pub fn fail_next_listen(&self, error: &str) {
        lock(&self.inner).fail_next_listen = Some(error.to_string());
    }

    /// Cause the next accepted connection to fail the listener instead.
    ///
    /// The incoming channel is closed and `accept()` returns an error.
    pub fn fail_next_accept(&self, error: &str) {
        lock(&self.inner).fail_next_accept = Some(error.to_string());
    }

    /// Number of `connect()` calls so far, failed ones included.
    pub fn connect_attempts(&self) -> u64 {
        lock(&self.inner).connect_attempts
    }

    /// Check whether a live listener holds `session`.
    pub fn is_bound(&self, session: &SessionId) -> bool {
        lock(&self.inner)
            .listeners
            .get(session)
            .is_some_and(|b| !b.tx.is_closed())
    }
}

#[async_trait]
impl Signaling for MemorySignaling {
    async fn listen(&self, session: &SessionId) -> Result<Box<dyn Listener>, TransportError> {
        let mut inner = lock(&self.inner);

        if let Some(error) = inner.fail_next_listen.take() {
            return Err(TransportError::ListenFailed(error));
        }

        if inner
            .listeners
            .get(session)
            .is_some_and(|b| !b.tx.is_closed())
        {
            return Err(TransportError::SessionInUse(session.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.next_binding += 1;
        let id = inner.next_binding;
        inner.listeners.insert(session.clone(), Binding { id, tx });

        Ok(Box::new(MemoryListener {
            session: session.clone(),
            binding: id,
            rx: tokio::sync::Mutex::new(rx),
            table: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }

    async fn connect(
        &self,
        session: &SessionId,
        metadata: Option<ConnectMetadata>,
    ) -> Result<Arc<dyn Channel>, TransportError> {
        let tx = {
            let mut inner = lock(&self.inner);
            inner.connect_attempts += 1;

            if let Some(error) = inner.fail_next_connect.take() {
                return Err(TransportError::ConnectionFailed(error));
            }

            inner
                .listeners
                .get(session)
                .map(|b| b.tx.clone())
                .ok_or_else(|| TransportError::ConnectionFailed(format!("no host for {session}")))?
        };

        let (local, remote) = MemoryChannel::pair();
        let incoming = Incoming {
            remote_id: PeerId::new(),
            metadata,
            channel: Arc::new(remote),
        };

        tx.send(incoming)
            .map_err(|_| TransportError::ConnectionFailed(format!("host for {session} is gone")))?;

        Ok(Arc::new(local))
    }
}

struct MemoryListener {
    session: SessionId,
    binding: u64,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Incoming>>,
    table: Arc<Mutex<SignalingInner>>,
    closed: AtomicBool,
}

impl MemoryListener {
    fn release(&self) {
        let mut inner = lock(&self.table);
        if inner
            .listeners
            .get(&self.session)
            .is_some_and(|b| b.id == self.binding)
        {
            // dropping the last sender wakes a pending accept with None
            inner.listeners.remove(&self.session);
        }
    }
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&self) -> Result<Option<Incoming>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let next = self.rx.lock().await.recv().await;

        if self.closed.load(Ordering::SeqCst) {
            if let Some(incoming) = next {
                incoming.channel.close().await;
            }
            return Ok(None);
        }

        let failure = lock(&self.table).fail_next_accept.take();
        if let Some(error) = failure {
            if let Some(incoming) = next {
                incoming.channel.close().await;
            }
            return Err(TransportError::ReceiveFailed(error));
        }
        Ok(next)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.release();
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.release();
    }
}

/// One end of an in-memory duplex channel.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    closed: Arc<watch::Sender<bool>>,
}

impl MemoryChannel {
    /// Create two connected ends sharing one close flag.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);

        let a = Self {
            tx: Mutex::new(Some(a_tx)),
            rx: tokio::sync::Mutex::new(a_rx),
            closed: Arc::clone(&closed),
        };
        let b = Self {
            tx: Mutex::new(Some(b_tx)),
            rx: tokio::sync::Mutex::new(b_rx),
            closed,
        };
        (a, b)
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }

        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx
                .send(text.to_string())
                .map_err(|_| TransportError::ConnectionClosed),
            None => Err(TransportError::NotConnected),
        }
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        let closed = self.closed.subscribe();
        let mut rx = self.rx.lock().await;

        // frames sent before the close are still delivered
        tokio::select! {
            biased;
            frame = rx.recv() => Ok(frame),
            _ = wait_closed(closed) => Ok(None),
        }
    }

    fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
