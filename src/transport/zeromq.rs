//! ZeroMQ transport over `libzmq`.
//!
//! [`ZmqContext`] wraps a `zmq::Context` and hands out [`ZmqSocket`]s, so
//! every stream in this crate can drive real `tcp://`, `ipc://` and
//! `inproc://` endpoints. New sockets get the context defaults used across
//! zkit: IPv6 enabled and a 300 ms linger. `Sub` sockets start with no
//! subscription; call [`ZmqSocket::subscribe`] on the handle a pool hands
//! out.
//!
//! Sends and receives never block (`DONTWAIT`); readiness comes from
//! `zmq::poll`. A poll holds the lock of every polled socket until it
//! returns, so I/O on those sockets belongs on the polling thread.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use super::{Frames, Interest, MessageSocket, Readiness, SocketId, SocketKind, Transport};
use crate::error::TransportError;

/// Linger applied to every new socket, in milliseconds.
pub const DEFAULT_LINGER_MS: i32 = 300;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn socket_type(kind: SocketKind) -> zmq::SocketType {
    match kind {
        SocketKind::Pair => zmq::PAIR,
        SocketKind::Dealer => zmq::DEALER,
        SocketKind::Router => zmq::ROUTER,
        SocketKind::Req => zmq::REQ,
        SocketKind::Rep => zmq::REP,
        SocketKind::Push => zmq::PUSH,
        SocketKind::Pull => zmq::PULL,
        SocketKind::Pub => zmq::PUB,
        SocketKind::Sub => zmq::SUB,
    }
}

fn transport_error(err: zmq::Error, endpoint: Option<&str>) -> TransportError {
    match err {
        zmq::Error::EAGAIN => TransportError::WouldBlock,
        zmq::Error::ETERM | zmq::Error::ENOTSOCK => TransportError::Closed,
        zmq::Error::EADDRINUSE => {
            TransportError::AddressInUse(endpoint.unwrap_or_default().to_string())
        }
        zmq::Error::EINVAL | zmq::Error::EPROTONOSUPPORT | zmq::Error::ENOCOMPATPROTO
            if endpoint.is_some() =>
        {
            TransportError::InvalidEndpoint(endpoint.unwrap_or_default().to_string())
        }
        other => TransportError::Failed(other.to_string()),
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// A `libzmq` context and socket factory.
///
/// Clones share the same `zmq::Context`, so `inproc://` endpoints bound
/// through one clone are reachable through all of them.
#[derive(Clone)]
pub struct ZmqContext {
    ctx: zmq::Context,
    next_id: Arc<AtomicU64>,
}

impl ZmqContext {
    /// Creates a fresh context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_context(zmq::Context::new())
    }

    /// Wraps an existing context, sharing it with other users.
    #[must_use]
    pub fn with_context(ctx: zmq::Context) -> Self {
        Self {
            ctx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns the wrapped context.
    #[must_use]
    pub fn context(&self) -> &zmq::Context {
        &self.ctx
    }
}

impl Default for ZmqContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ZmqContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZmqContext")
            .field("sockets_created", &(self.next_id.load(Ordering::Relaxed) - 1))
            .finish_non_exhaustive()
    }
}

impl Transport for ZmqContext {
    type Socket = ZmqSocket;

    fn socket(&self, kind: SocketKind) -> Result<ZmqSocket, TransportError> {
        let inner = self
            .ctx
            .socket(socket_type(kind))
            .map_err(|err| transport_error(err, None))?;
        inner
            .set_ipv6(true)
            .and_then(|()| inner.set_linger(DEFAULT_LINGER_MS))
            .map_err(|err| transport_error(err, None))?;
        let id = SocketId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(socket = %id, kind = %kind, "zmq socket created");
        Ok(ZmqSocket {
            id,
            kind,
            inner: Arc::new(Mutex::new(Some(inner))),
        })
    }

    fn poll(
        &self,
        items: &[(ZmqSocket, Interest)],
        timeout: Option<Duration>,
    ) -> Result<Vec<(ZmqSocket, Readiness)>, TransportError> {
        let mut seen = HashSet::with_capacity(items.len());
        let guards: Vec<_> = items
            .iter()
            .filter(|(socket, _)| seen.insert(socket.id))
            .map(|(socket, interest)| (socket, *interest, lock(&socket.inner)))
            .collect();

        let mut polled = Vec::with_capacity(guards.len());
        let mut poll_items = Vec::with_capacity(guards.len());
        for (socket, interest, guard) in &guards {
            let Some(inner) = guard.as_ref() else {
                continue;
            };
            let events = match (interest.is_readable(), interest.is_writable()) {
                (true, true) => zmq::POLLIN | zmq::POLLOUT,
                (true, false) => zmq::POLLIN,
                (false, true) => zmq::POLLOUT,
                (false, false) => continue,
            };
            poll_items.push(inner.as_poll_item(events));
            polled.push(*socket);
        }

        let timeout_ms = timeout.map_or(-1, millis);
        match zmq::poll(&mut poll_items, timeout_ms) {
            Ok(_) => {}
            Err(zmq::Error::EINTR) => return Ok(Vec::new()),
            Err(err) => return Err(transport_error(err, None)),
        }

        let ready = poll_items
            .iter()
            .zip(polled)
            .filter_map(|(item, socket)| {
                let readiness = Readiness {
                    readable: item.is_readable(),
                    writable: item.is_writable(),
                };
                (!readiness.is_empty()).then(|| (socket.clone(), readiness))
            })
            .collect();
        Ok(ready)
    }
}

/// A shared handle to one `libzmq` socket.
///
/// Clones refer to the same socket and compare equal. After
/// [`MessageSocket::close`] the underlying socket is gone and every
/// operation returns [`TransportError::Closed`].
#[derive(Clone)]
pub struct ZmqSocket {
    id: SocketId,
    kind: SocketKind,
    inner: Arc<Mutex<Option<zmq::Socket>>>,
}

impl ZmqSocket {
    fn with_socket<R>(
        &self,
        endpoint: Option<&str>,
        op: impl FnOnce(&zmq::Socket) -> zmq::Result<R>,
    ) -> Result<R, TransportError> {
        let guard = lock(&self.inner);
        let Some(socket) = guard.as_ref() else {
            return Err(TransportError::Closed);
        };
        op(socket).map_err(|err| transport_error(err, endpoint))
    }

    /// Subscribes a `Sub` socket to messages starting with `prefix`. An
    /// empty prefix receives everything.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unsupported`] for other socket kinds and
    /// [`TransportError::Closed`] once the socket is closed.
    pub fn subscribe(&self, prefix: &[u8]) -> Result<(), TransportError> {
        if self.kind != SocketKind::Sub {
            return Err(TransportError::Unsupported {
                kind: self.kind,
                operation: "subscribe",
            });
        }
        self.with_socket(None, |socket| socket.set_subscribe(prefix))
    }
}

impl PartialEq for ZmqSocket {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ZmqSocket {}

impl Hash for ZmqSocket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ZmqSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZmqSocket")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MessageSocket for ZmqSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn kind(&self) -> SocketKind {
        self.kind
    }

    fn bind(&self, endpoint: &str) -> Result<(), TransportError> {
        self.with_socket(Some(endpoint), |socket| socket.bind(endpoint))
    }

    fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        self.with_socket(Some(endpoint), |socket| socket.connect(endpoint))
    }

    fn send(&self, frames: Frames) -> Result<(), TransportError> {
        if !self.kind.can_send() {
            return Err(TransportError::Unsupported {
                kind: self.kind,
                operation: "send",
            });
        }
        self.with_socket(None, |socket| {
            socket.send_multipart(frames.iter().map(|frame| &frame[..]), zmq::DONTWAIT)
        })
    }

    fn recv_multipart(&self) -> Result<Frames, TransportError> {
        let frames = self.with_socket(None, |socket| socket.recv_multipart(zmq::DONTWAIT))?;
        Ok(frames.into_iter().map(Bytes::from).collect())
    }

    fn close(&self, linger: Duration) -> Result<(), TransportError> {
        let Some(socket) = lock(&self.inner).take() else {
            return Ok(());
        };
        let linger_ms = i32::try_from(linger.as_millis()).unwrap_or(i32::MAX);
        let applied = socket.set_linger(linger_ms);
        drop(socket);
        tracing::trace!(socket = %self.id, "zmq socket closed");
        applied.map_err(|err| transport_error(err, None))
    }

    fn is_closed(&self) -> bool {
        lock(&self.inner).is_none()
    }
}
