//! Events yielded by a [`super::DiscoveredStream`].

use crate::transport::Readiness;

/// One step of a discovered stream.
///
/// Traffic on pool sockets and on any socket registered by the caller
/// comes through as [`DiscoveryEvent::Ready`]. Pool membership changes
/// come through as [`DiscoveryEvent::Found`] and [`DiscoveryEvent::Lost`];
/// within one discovery round every `Lost` precedes every `Found`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent<S> {
    /// A socket is ready for one of its interests.
    Ready {
        /// The ready socket.
        socket: S,
        /// Which directions are ready.
        readiness: Readiness,
    },

    /// A new endpoint appeared and a socket was connected to it. The
    /// socket is already registered for readability.
    Found(S),

    /// An endpoint disappeared. Its socket has been unregistered and
    /// closed; the handle is only good for identification.
    Lost(S),

    /// The stream is closed. Every later call yields this again.
    Closed,
}

impl<S> DiscoveryEvent<S> {
    /// Returns `true` for the end-of-stream marker.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the socket carried by the event, if any.
    #[must_use]
    pub const fn socket(&self) -> Option<&S> {
        match self {
            Self::Ready { socket, .. } | Self::Found(socket) | Self::Lost(socket) => Some(socket),
            Self::Closed => None,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Found(_) => "found",
            Self::Lost(_) => "lost",
            Self::Closed => "closed",
        }
    }
}
