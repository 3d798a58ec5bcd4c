//! Connection lifecycle state machine for floor-sync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! connection status of one role (host, director or public viewer). The
//! machine takes events as input and produces a new state plus a list of
//! actions to execute.
//!
//! The actual I/O (tearing down channels, connecting, sleeping) is performed
//! by sync-client and sync-host, not by this module.
//!
//! ```text
//! disconnected ──ConnectRequested──► connecting ──Opened──► connected
//!      ▲                                  │                     │
//!      └──────────────Closed──────────────┴─────────────────────┘
//!
//! any ──TransportError──► error   (terminal until ConnectRequested,
//!                                  or the backoff timer for viewers)
//! ```

use std::fmt;
use std::time::Duration;

/// Default base delay of the public-viewer backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default cap of the public-viewer backoff.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// User-visible connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// No session, or the session ended.
    #[default]
    Disconnected,
    /// Connection or bind in progress.
    Connecting,
    /// Live.
    Connected,
    /// Transport failure.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Exponential backoff parameters: `min(max, base * 2^attempt)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay of the first retry.
    pub base: Duration,
    /// Upper bound of any retry delay.
    pub max: Duration,
}

impl Backoff {
    /// Create a backoff with explicit parameters.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        // 2^31 already overflows any sane base, so clamp the shift
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

/// How a role recovers from a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Wait for an explicit retry from the user (host and director roles).
    #[default]
    Manual,
    /// Retry automatically with exponential backoff (public viewers).
    Backoff(Backoff),
}

/// Lifecycle of one role's connection. NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lifecycle {
    policy: RetryPolicy,
    status: ConnectionStatus,
    attempt: u32,
}

impl Lifecycle {
    /// Create a lifecycle in the Disconnected state.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            status: ConnectionStatus::Disconnected,
            attempt: 0,
        }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Consecutive failures since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Retry policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller is
    /// responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        use ConnectionStatus::*;

        match (self.status, event) {
            // Entry to connecting always tears down what the role held before
            (_, Event::ConnectRequested) => {
                let next = Self {
                    status: Connecting,
                    ..self
                };
                (
                    next,
                    vec![Action::TearDown, Action::Connect, Action::EmitStatus(Connecting)],
                )
            }

            (Connecting, Event::Opened) => {
                let next = Self {
                    status: Connected,
                    attempt: 0,
                    ..self
                };
                (next, vec![Action::EmitStatus(Connected)])
            }

            (Connecting | Connected, Event::Closed) => self.lost(Disconnected, false),

            (Connecting | Connected, Event::TransportError) => self.lost(Error, true),

            (Disconnected | Error, Event::ReconnectTimer) => match self.policy {
                RetryPolicy::Backoff(_) => {
                    let next = Self {
                        status: Connecting,
                        ..self
                    };
                    (
                        next,
                        vec![Action::TearDown, Action::Connect, Action::EmitStatus(Connecting)],
                    )
                }
                RetryPolicy::Manual => (self, vec![]),
            },

            (_, Event::CloseRequested) => {
                let next = Self {
                    status: Disconnected,
                    attempt: 0,
                    ..self
                };
                (
                    next,
                    vec![
                        Action::CancelReconnect,
                        Action::TearDown,
                        Action::EmitStatus(Disconnected),
                    ],
                )
            }

            // Late close/error reports after teardown, opens without a
            // pending connect: stay put
            (_, _) => (self, vec![]),
        }
    }

    fn lost(self, status: ConnectionStatus, tear_down: bool) -> (Self, Vec<Action>) {
        let mut actions = Vec::with_capacity(3);
        if tear_down {
            actions.push(Action::TearDown);
        }
        actions.push(Action::EmitStatus(status));

        let attempt = match self.policy {
            RetryPolicy::Backoff(backoff) => {
                actions.push(Action::StartReconnectTimer {
                    delay: backoff.delay(self.attempt),
                });
                self.attempt.saturating_add(1)
            }
            RetryPolicy::Manual => self.attempt,
        };

        let next = Self {
            status,
            attempt,
            ..self
        };
        (next, actions)
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Create, join or retry was requested.
    ConnectRequested,
    /// The role is live: listener bound, or first snapshot received.
    Opened,
    /// The connection closed.
    Closed,
    /// The transport reported an error.
    TransportError,
    /// The user closed the session.
    CloseRequested,
    /// The backoff timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the role's driver.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Close every connection/listener currently held by the role.
    TearDown,
    /// Open a new connection or listener.
    Connect,
    /// Start a timer that delivers [`Event::ReconnectTimer`].
    StartReconnectTimer {
        /// Delay before the retry.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Publish a status change to observers.
    EmitStatus(ConnectionStatus),
}
