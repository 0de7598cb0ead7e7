//! Message-socket transport boundary.
//!
//! The streams in this crate do not talk to a network directly. They drive
//! a [`Transport`] (a socket factory plus a readiness poller) and the
//! [`MessageSocket`]s it hands out. [`inproc`] provides an in-process
//! implementation used by the streams' own control channel and by tests.
//! With the `zmq-transport` feature, `zeromq` provides one backed by
//! `libzmq`.

pub mod inproc;
pub mod socket_id;
#[cfg(feature = "zmq-transport")]
pub mod zeromq;

use std::fmt;
use std::hash::Hash;
use std::ops::BitOr;
use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportError;

pub use socket_id::SocketId;

/// A multipart message: one [`Bytes`] value per frame.
pub type Frames = Vec<Bytes>;

/// Messaging pattern of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// Exclusive pair.
    Pair,
    /// Asynchronous request side, round-robin over peers.
    Dealer,
    /// Asynchronous reply side.
    Router,
    /// Synchronous request side.
    Req,
    /// Synchronous reply side.
    Rep,
    /// Pipeline producer.
    Push,
    /// Pipeline consumer.
    Pull,
    /// Publisher, fans out to every peer.
    Pub,
    /// Subscriber.
    Sub,
}

impl SocketKind {
    /// Returns the socket kind as a lowercase static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pair => "pair",
            Self::Dealer => "dealer",
            Self::Router => "router",
            Self::Req => "req",
            Self::Rep => "rep",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Pub => "pub",
            Self::Sub => "sub",
        }
    }

    /// Returns `true` if sockets of this kind can send messages.
    #[must_use]
    pub const fn can_send(self) -> bool {
        !matches!(self, Self::Pull | Self::Sub)
    }

    /// Returns `true` if sockets of this kind can receive messages.
    #[must_use]
    pub const fn can_receive(self) -> bool {
        !matches!(self, Self::Push | Self::Pub)
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SocketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pair" => Ok(Self::Pair),
            "dealer" => Ok(Self::Dealer),
            "router" => Ok(Self::Router),
            "req" => Ok(Self::Req),
            "rep" => Ok(Self::Rep),
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            "pub" => Ok(Self::Pub),
            "sub" => Ok(Self::Sub),
            other => Err(format!("unknown socket kind: {other}")),
        }
    }
}

/// What a registered item wants to be woken up for.
///
/// Sockets use [`Interest::READABLE`], [`Interest::WRITABLE`] or both
/// combined with `|`. Timers must use [`Interest::TIMER`], which can not
/// be combined with anything.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interest(u8);

impl Interest {
    /// A message can be received without blocking.
    pub const READABLE: Self = Self(0b001);
    /// A message can be queued for sending without blocking.
    pub const WRITABLE: Self = Self(0b010);
    /// The registered item is a timer.
    pub const TIMER: Self = Self(0b100);

    const SOCKET_BITS: u8 = Self::READABLE.0 | Self::WRITABLE.0;

    /// Returns `true` if readability is requested.
    #[must_use]
    pub const fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    /// Returns `true` if writability is requested.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    /// Returns `true` if this is exactly the timer interest.
    #[must_use]
    pub const fn is_timer(self) -> bool {
        self.0 == Self::TIMER.0
    }

    /// Returns `true` if this is a valid interest set for a socket: one or
    /// both of the readable and writable flags and nothing else.
    #[must_use]
    pub const fn is_socket_interest(self) -> bool {
        self.0 != 0 && self.0 & !Self::SOCKET_BITS == 0
    }
}

impl BitOr for Interest {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::with_capacity(3);
        if self.is_readable() {
            names.push("READABLE");
        }
        if self.is_writable() {
            names.push("WRITABLE");
        }
        if self.0 & Self::TIMER.0 != 0 {
            names.push("TIMER");
        }
        if names.is_empty() {
            f.write_str("(empty)")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interest({self})")
    }
}

/// Readiness reported by a poll for one socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Readiness {
    /// A message can be received without blocking.
    pub readable: bool,
    /// A message can be sent without blocking.
    pub writable: bool,
}

impl Readiness {
    /// Readiness for reading only.
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
    };
    /// Readiness for writing only.
    pub const WRITABLE: Self = Self {
        readable: false,
        writable: true,
    };

    /// Returns `true` if neither direction is ready.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !self.readable && !self.writable
    }
}

/// A handle to a message-oriented socket.
///
/// Handles are cheap to clone and compare by identity: two clones of the
/// same socket are equal, two distinct sockets never are. This lets a
/// stream keep a registration while the caller keeps its own handle for
/// I/O.
pub trait MessageSocket: Clone + Eq + Hash + fmt::Debug + Send + 'static {
    /// Returns the socket's identity.
    fn id(&self) -> SocketId;

    /// Returns the socket's messaging pattern.
    fn kind(&self) -> SocketKind;

    /// Binds the socket to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the endpoint is taken or invalid or
    /// the socket is closed.
    fn bind(&self, endpoint: &str) -> Result<(), TransportError>;

    /// Connects the socket to `endpoint`. The peer does not have to exist
    /// yet.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the endpoint is invalid or the
    /// socket is closed.
    fn connect(&self, endpoint: &str) -> Result<(), TransportError>;

    /// Sends a multipart message without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WouldBlock`] if no peer can take the
    /// message, or another [`TransportError`] on failure.
    fn send(&self, frames: Frames) -> Result<(), TransportError>;

    /// Receives a multipart message without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WouldBlock`] if no message is queued, or
    /// another [`TransportError`] on failure.
    fn recv_multipart(&self) -> Result<Frames, TransportError>;

    /// Closes the socket, allowing up to `linger` for pending messages.
    /// Closing an already closed socket does nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport fails to release the
    /// socket.
    fn close(&self, linger: Duration) -> Result<(), TransportError>;

    /// Returns `true` once [`MessageSocket::close`] has been called.
    fn is_closed(&self) -> bool;
}

/// A socket factory and readiness poller.
///
/// A transport is a shareable handle (`Clone + Send + Sync`) so that a
/// termination request can build its own short-lived socket from another
/// thread.
pub trait Transport: Clone + Send + Sync + fmt::Debug + 'static {
    /// Socket type produced by this transport.
    type Socket: MessageSocket;

    /// Creates a new socket of the given kind.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the socket can not be created.
    fn socket(&self, kind: SocketKind) -> Result<Self::Socket, TransportError>;

    /// Waits until at least one of `items` is ready for one of its
    /// interests, or until `timeout` elapses. `None` waits indefinitely.
    ///
    /// Ready sockets are returned in the order of `items`. An empty result
    /// means the timeout elapsed.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the underlying poll fails.
    fn poll(
        &self,
        items: &[(Self::Socket, Interest)],
        timeout: Option<Duration>,
    ) -> Result<Vec<(Self::Socket, Readiness)>, TransportError>;
}
