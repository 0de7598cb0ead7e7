//! Error types for streams, transports, discovery and configuration.
//!
//! [`StreamError`] is the central error type of the crate. Registration
//! and unregistration mistakes are reported synchronously by the call that
//! made them; nothing is queued and raised later during iteration.
//! Transport failures travel through [`StreamError::Transport`] unchanged.

use crate::transport::{Interest, SocketKind};

/// Errors raised by the message-socket transport.
///
/// These are produced by [`crate::transport::Transport`] and
/// [`crate::transport::MessageSocket`] implementations and are surfaced to
/// callers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The operation could not complete without blocking.
    #[error("operation would block")]
    WouldBlock,

    /// The socket has already been closed.
    #[error("socket is closed")]
    Closed,

    /// Another live socket is already bound to the endpoint.
    #[error("endpoint already in use: {0}")]
    AddressInUse(String),

    /// The endpoint string is not usable by this transport.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Any other failure reported by the underlying messaging library.
    #[error("transport failure: {0}")]
    Failed(String),

    /// The socket kind does not support the requested operation.
    #[error("{kind} sockets do not support {operation}")]
    Unsupported {
        /// Kind of the socket the operation was attempted on.
        kind: SocketKind,
        /// Name of the rejected operation.
        operation: &'static str,
    },
}

/// Errors raised by event streams, timers and discovered pools.
///
/// # Categories
///
/// | Variant                 | Raised by                      | Nature              |
/// |-------------------------|--------------------------------|---------------------|
/// | `InvalidInterest`       | `register`                     | caller misuse       |
/// | `UnsupportedSocketKind` | `DiscoveredStream::new`        | caller misuse       |
/// | `PoolSocket`            | `DiscoveredStream::register`   | caller misuse       |
/// | `NotRegistered`         | `unregister`                   | caller misuse       |
/// | `NotScheduled`          | `Timer::remaining`             | caller misuse       |
/// | `UnexpectedEvent`       | `MessageStream::next_event`    | invariant violation |
/// | `Transport`             | any call touching a socket     | transport failure   |
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A socket was registered with the timer interest, a timer with a
    /// socket interest, or a socket with an empty interest set.
    #[error("invalid interest {interest} for {target}")]
    InvalidInterest {
        /// The rejected interest set.
        interest: Interest,
        /// What was being registered (`"socket"` or `"timer"`).
        target: &'static str,
    },

    /// Discovered pools only manage connect-only socket kinds.
    #[error("unsupported socket kind for discovery: {0} (expected req, pull or sub)")]
    UnsupportedSocketKind(SocketKind),

    /// The socket belongs to a discovered pool, which alone registers and
    /// unregisters it.
    #[error("socket is managed by the discovered pool")]
    PoolSocket,

    /// The item passed to `unregister` is not registered.
    #[error("item not registered")]
    NotRegistered,

    /// The remaining time of a disarmed timer was read.
    #[error("timer not scheduled")]
    NotScheduled,

    /// The stream produced an event its consumer can not handle. This
    /// indicates a registration bug rather than a runtime condition.
    #[error("unexpected event: {0}")]
    UnexpectedEvent(String),

    /// Error propagated from the message-socket transport.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl StreamError {
    /// Returns `true` for errors caused by misusing the API, as opposed to
    /// transport failures or internal invariant violations.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::InvalidInterest { .. }
                | Self::UnsupportedSocketKind(_)
                | Self::PoolSocket
                | Self::NotRegistered
                | Self::NotScheduled
        )
    }
}

/// Errors raised while loading a [`crate::config::DiscoveryConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set to a value that can not be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Name of the variable.
        key: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}
