//! Registration items and the events an [`super::EventStream`] yields.

use super::timer::Timer;
use crate::transport::Readiness;

/// Something that can be registered with a stream.
///
/// Sockets and timers are told apart once, at registration time, by this
/// tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item<S> {
    /// A message socket.
    Socket(S),
    /// A timer.
    Timer(Timer),
}

/// One step of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent<S> {
    /// A registered socket is ready for one of its interests.
    Ready {
        /// The ready socket.
        socket: S,
        /// Which directions are ready.
        readiness: Readiness,
    },

    /// A registered timer expired. It has been disarmed and is still
    /// registered.
    Timer(Timer),

    /// The stream is closed. Every later call yields this again.
    Closed,
}

impl<S> StreamEvent<S> {
    /// Returns `true` for the end-of-stream marker.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Ready { readiness, .. } if readiness.readable && readiness.writable => {
                "readable_writable"
            }
            Self::Ready { readiness, .. } if readiness.readable => "readable",
            Self::Ready { .. } => "writable",
            Self::Timer(_) => "timer",
            Self::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names() {
        let readable: StreamEvent<u8> = StreamEvent::Ready {
            socket: 1,
            readiness: Readiness::READABLE,
        };
        assert_eq!(readable.event_type_str(), "readable");

        let both: StreamEvent<u8> = StreamEvent::Ready {
            socket: 1,
            readiness: Readiness {
                readable: true,
                writable: true,
            },
        };
        assert_eq!(both.event_type_str(), "readable_writable");

        let timer: StreamEvent<u8> = StreamEvent::Timer(Timer::new());
        assert_eq!(timer.event_type_str(), "timer");
        assert!(StreamEvent::<u8>::Closed.is_closed());
        assert!(!timer.is_closed());
    }
}
