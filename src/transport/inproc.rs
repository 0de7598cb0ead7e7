//! In-process message transport.
//!
//! A [`Context`] owns a table of endpoint names. Sockets created from it
//! bind and connect to those names in either order, and messages travel
//! between them through crossbeam channels without leaving the process.
//! Any string of the form `scheme://address` is a valid endpoint, so a
//! test can bind a socket to `tcp://10.0.0.1:9000` and have a pool socket
//! connect to it.
//!
//! Polling waits on a context-wide activity counter. Every send, connect,
//! bind and close bumps the counter and wakes all pollers, which then
//! rescan their sockets. Sockets from different contexts must not be
//! polled together.
//!
//! Socket kinds only shape the send side: `Pub` fans out to every peer,
//! other sending kinds round-robin, and `Pull` / `Sub` can not send.
//! Request/reply lockstep and subscription prefixes are not modelled.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::{Frames, Interest, MessageSocket, Readiness, SocketId, SocketKind, Transport};
use crate::error::TransportError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn validate_endpoint(endpoint: &str) -> Result<(), TransportError> {
    match endpoint.split_once("://") {
        Some((scheme, address)) if !scheme.is_empty() && !address.is_empty() => Ok(()),
        _ => Err(TransportError::InvalidEndpoint(endpoint.to_string())),
    }
}

/// Shared state of one context.
struct Shared {
    endpoints: Mutex<HashMap<String, EndpointEntry>>,
    next_id: AtomicU64,
    activity: Mutex<u64>,
    wakeup: Condvar,
}

impl Shared {
    fn notify(&self) {
        let mut activity = lock(&self.activity);
        *activity = activity.wrapping_add(1);
        self.wakeup.notify_all();
    }
}

#[derive(Default)]
struct EndpointEntry {
    binder: Option<Weak<SocketCore>>,
    connectors: Vec<Weak<SocketCore>>,
}

impl EndpointEntry {
    fn live_binder(&self) -> Option<Arc<SocketCore>> {
        self.binder
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|core| !core.is_closed())
    }

    fn is_empty(&self) -> bool {
        self.binder.is_none() && self.connectors.is_empty()
    }
}

struct SocketCore {
    id: SocketId,
    kind: SocketKind,
    inbox_tx: Sender<Frames>,
    inbox_rx: Receiver<Frames>,
    peers: Mutex<Vec<Weak<SocketCore>>>,
    next_peer: AtomicUsize,
    closed: AtomicBool,
    endpoints: Mutex<Vec<String>>,
    shared: Arc<Shared>,
}

impl SocketCore {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn open_peers(&self) -> Vec<Arc<SocketCore>> {
        lock(&self.peers)
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|peer| !peer.is_closed())
            .collect()
    }

    fn readiness(&self, interest: Interest) -> Readiness {
        if self.is_closed() {
            return Readiness::default();
        }
        let readable = interest.is_readable() && !self.inbox_rx.is_empty();
        let writable = interest.is_writable()
            && self.kind.can_send()
            && (self.kind == SocketKind::Pub || !self.open_peers().is_empty());
        Readiness { readable, writable }
    }
}

fn link(a: &Arc<SocketCore>, b: &Arc<SocketCore>) {
    if a.id == b.id {
        return;
    }
    lock(&a.peers).push(Arc::downgrade(b));
    lock(&b.peers).push(Arc::downgrade(a));
}

/// An in-process transport context.
///
/// Cheap to clone; all clones share the same endpoint table.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

impl Context {
    /// Creates a new, empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoints: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                activity: Mutex::new(0),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Creates a new socket of the given kind.
    #[must_use]
    pub fn new_socket(&self, kind: SocketKind) -> Socket {
        let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
        let id = SocketId::from_raw(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        Socket {
            core: Arc::new(SocketCore {
                id,
                kind,
                inbox_tx,
                inbox_rx,
                peers: Mutex::new(Vec::new()),
                next_peer: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                endpoints: Mutex::new(Vec::new()),
                shared: Arc::clone(&self.shared),
            }),
        }
    }

    /// Returns `true` if a live socket is bound to `endpoint`.
    #[must_use]
    pub fn is_bound(&self, endpoint: &str) -> bool {
        lock(&self.shared.endpoints)
            .get(endpoint)
            .and_then(EndpointEntry::live_binder)
            .is_some()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("endpoints", &lock(&self.shared.endpoints).len())
            .finish()
    }
}

impl Transport for Context {
    type Socket = Socket;

    fn socket(&self, kind: SocketKind) -> Result<Socket, TransportError> {
        Ok(self.new_socket(kind))
    }

    fn poll(
        &self,
        items: &[(Socket, Interest)],
        timeout: Option<Duration>,
    ) -> Result<Vec<(Socket, Readiness)>, TransportError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let wait_forever = timeout.is_none() || deadline.is_none();
        loop {
            // Read the counter before scanning so activity during the scan
            // is noticed below.
            let seen = *lock(&self.shared.activity);
            let ready: Vec<(Socket, Readiness)> = items
                .iter()
                .filter_map(|(socket, interest)| {
                    let readiness = socket.core.readiness(*interest);
                    (!readiness.is_empty()).then(|| (socket.clone(), readiness))
                })
                .collect();
            if !ready.is_empty() {
                return Ok(ready);
            }

            let guard = lock(&self.shared.activity);
            if *guard != seen {
                continue;
            }
            if wait_forever {
                drop(
                    self.shared
                        .wakeup
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner),
                );
                continue;
            }
            let Some(deadline) = deadline else {
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            drop(
                self.shared
                    .wakeup
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner),
            );
        }
    }
}

/// A socket handle created by a [`Context`].
///
/// Clones refer to the same socket. Equality and hashing use the socket's
/// [`SocketId`].
#[derive(Clone)]
pub struct Socket {
    core: Arc<SocketCore>,
}

impl Socket {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.core.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// Returns the number of open peers this socket is linked to.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.core.open_peers().len()
    }

    /// Sends a single-frame message.
    ///
    /// # Errors
    ///
    /// See [`MessageSocket::send`].
    pub fn send_bytes(&self, frame: impl Into<bytes::Bytes>) -> Result<(), TransportError> {
        self.send(vec![frame.into()])
    }
}

impl PartialEq for Socket {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl Eq for Socket {}

impl Hash for Socket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.id.hash(state);
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.core.id)
            .field("kind", &self.core.kind)
            .field("closed", &self.core.is_closed())
            .finish()
    }
}

impl MessageSocket for Socket {
    fn id(&self) -> SocketId {
        self.core.id
    }

    fn kind(&self) -> SocketKind {
        self.core.kind
    }

    fn bind(&self, endpoint: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        validate_endpoint(endpoint)?;
        {
            let mut table = lock(&self.core.shared.endpoints);
            let entry = table.entry(endpoint.to_string()).or_default();
            if entry.live_binder().is_some() {
                return Err(TransportError::AddressInUse(endpoint.to_string()));
            }
            entry.binder = Some(Arc::downgrade(&self.core));
            entry
                .connectors
                .retain(|w| w.upgrade().is_some_and(|core| !core.is_closed()));
            for connector in entry.connectors.iter().filter_map(Weak::upgrade) {
                link(&self.core, &connector);
            }
        }
        lock(&self.core.endpoints).push(endpoint.to_string());
        tracing::trace!(socket = %self.core.id, endpoint, "inproc bind");
        self.core.shared.notify();
        Ok(())
    }

    fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        validate_endpoint(endpoint)?;
        {
            let mut table = lock(&self.core.shared.endpoints);
            let entry = table.entry(endpoint.to_string()).or_default();
            entry.connectors.push(Arc::downgrade(&self.core));
            if let Some(binder) = entry.live_binder() {
                link(&self.core, &binder);
            }
        }
        lock(&self.core.endpoints).push(endpoint.to_string());
        tracing::trace!(socket = %self.core.id, endpoint, "inproc connect");
        self.core.shared.notify();
        Ok(())
    }

    fn send(&self, frames: Frames) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !self.core.kind.can_send() {
            return Err(TransportError::Unsupported {
                kind: self.core.kind,
                operation: "send",
            });
        }
        let peers = self.core.open_peers();
        if self.core.kind == SocketKind::Pub {
            for peer in &peers {
                // A peer closing concurrently just misses the message.
                let _ = peer.inbox_tx.send(frames.clone());
            }
        } else {
            if peers.is_empty() {
                return Err(TransportError::WouldBlock);
            }
            let index = self.core.next_peer.fetch_add(1, Ordering::Relaxed) % peers.len();
            let Some(peer) = peers.get(index) else {
                return Err(TransportError::WouldBlock);
            };
            peer.inbox_tx
                .send(frames)
                .map_err(|_| TransportError::Closed)?;
        }
        self.core.shared.notify();
        Ok(())
    }

    fn recv_multipart(&self) -> Result<Frames, TransportError> {
        self.ensure_open()?;
        if !self.core.kind.can_receive() {
            return Err(TransportError::Unsupported {
                kind: self.core.kind,
                operation: "recv",
            });
        }
        match self.core.inbox_rx.try_recv() {
            Ok(frames) => Ok(frames),
            Err(TryRecvError::Empty) => Err(TransportError::WouldBlock),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn close(&self, linger: Duration) -> Result<(), TransportError> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let me = self.core.id;
        {
            let mut table = lock(&self.core.shared.endpoints);
            for endpoint in lock(&self.core.endpoints).drain(..) {
                let Some(entry) = table.get_mut(&endpoint) else {
                    continue;
                };
                if entry
                    .binder
                    .as_ref()
                    .and_then(Weak::upgrade)
                    .is_some_and(|core| core.id == me)
                {
                    entry.binder = None;
                }
                entry
                    .connectors
                    .retain(|w| w.upgrade().is_some_and(|core| core.id != me));
                if entry.is_empty() {
                    table.remove(&endpoint);
                }
            }
        }
        let peers = std::mem::take(&mut *lock(&self.core.peers));
        for peer in peers.iter().filter_map(Weak::upgrade) {
            lock(&peer.peers).retain(|w| w.upgrade().is_some_and(|core| core.id != me));
        }
        // Delivered messages already sit in the peers' inboxes, so there is
        // nothing left to linger for; unread inbound messages are dropped.
        while self.core.inbox_rx.try_recv().is_ok() {}
        tracing::trace!(
            socket = %me,
            linger_ms = linger.as_millis(),
            "inproc socket closed"
        );
        self.core.shared.notify();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::thread;

    fn pair(ctx: &Context, endpoint: &str) -> (Socket, Socket) {
        let server = ctx.new_socket(SocketKind::Push);
        let client = ctx.new_socket(SocketKind::Pull);
        let Ok(()) = server.bind(endpoint) else {
            panic!("bind failed");
        };
        let Ok(()) = client.connect(endpoint) else {
            panic!("connect failed");
        };
        (server, client)
    }

    #[test]
    fn bind_then_connect_delivers() {
        let ctx = Context::new();
        let (push, pull) = pair(&ctx, "inproc://a");
        assert!(push.send_bytes(&b"hello"[..]).is_ok());
        let Ok(frames) = pull.recv_multipart() else {
            panic!("expected a message");
        };
        assert_eq!(frames, vec![bytes::Bytes::from_static(b"hello")]);
    }

    #[test]
    fn connect_before_bind_links_later() {
        let ctx = Context::new();
        let pull = ctx.new_socket(SocketKind::Pull);
        let push = ctx.new_socket(SocketKind::Push);
        assert!(pull.connect("tcp://10.0.0.1:9000").is_ok());
        assert_eq!(push.send_bytes(&b"x"[..]), Err(TransportError::WouldBlock));
        assert!(push.bind("tcp://10.0.0.1:9000").is_ok());
        assert_eq!(push.peer_count(), 1);
        assert!(push.send_bytes(&b"x"[..]).is_ok());
        assert!(pull.recv_multipart().is_ok());
    }

    #[test]
    fn recv_on_empty_would_block() {
        let ctx = Context::new();
        let (_push, pull) = pair(&ctx, "inproc://empty");
        assert_eq!(pull.recv_multipart(), Err(TransportError::WouldBlock));
    }

    #[test]
    fn pull_can_not_send() {
        let ctx = Context::new();
        let (_push, pull) = pair(&ctx, "inproc://pull");
        let Err(TransportError::Unsupported { operation, .. }) = pull.send_bytes(&b"x"[..]) else {
            panic!("expected unsupported");
        };
        assert_eq!(operation, "send");
    }

    #[test]
    fn push_round_robins_over_peers() {
        let ctx = Context::new();
        let push = ctx.new_socket(SocketKind::Push);
        let a = ctx.new_socket(SocketKind::Pull);
        let b = ctx.new_socket(SocketKind::Pull);
        assert!(push.bind("inproc://rr").is_ok());
        assert!(a.connect("inproc://rr").is_ok());
        assert!(b.connect("inproc://rr").is_ok());
        assert!(push.send_bytes(&b"1"[..]).is_ok());
        assert!(push.send_bytes(&b"2"[..]).is_ok());
        assert!(a.recv_multipart().is_ok());
        assert!(b.recv_multipart().is_ok());
    }

    #[test]
    fn pub_fans_out() {
        let ctx = Context::new();
        let publisher = ctx.new_socket(SocketKind::Pub);
        let a = ctx.new_socket(SocketKind::Sub);
        let b = ctx.new_socket(SocketKind::Sub);
        assert!(publisher.bind("inproc://pub").is_ok());
        assert!(a.connect("inproc://pub").is_ok());
        assert!(b.connect("inproc://pub").is_ok());
        assert!(publisher.send_bytes(&b"news"[..]).is_ok());
        assert!(a.recv_multipart().is_ok());
        assert!(b.recv_multipart().is_ok());
    }

    #[test]
    fn pub_without_peers_drops_silently() {
        let ctx = Context::new();
        let publisher = ctx.new_socket(SocketKind::Pub);
        assert!(publisher.send_bytes(&b"void"[..]).is_ok());
    }

    #[test]
    fn address_in_use_until_closed() {
        let ctx = Context::new();
        let first = ctx.new_socket(SocketKind::Dealer);
        let second = ctx.new_socket(SocketKind::Dealer);
        assert!(first.bind("inproc://busy").is_ok());
        assert!(ctx.is_bound("inproc://busy"));
        assert_eq!(
            second.bind("inproc://busy"),
            Err(TransportError::AddressInUse("inproc://busy".to_string()))
        );
        assert!(first.close(Duration::ZERO).is_ok());
        assert!(!ctx.is_bound("inproc://busy"));
        assert!(second.bind("inproc://busy").is_ok());
    }

    #[test]
    fn invalid_endpoint_rejected() {
        let ctx = Context::new();
        let sock = ctx.new_socket(SocketKind::Dealer);
        assert!(matches!(
            sock.bind("no-scheme"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            sock.connect("tcp://"),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn close_is_idempotent_and_unlinks_peers() {
        let ctx = Context::new();
        let (push, pull) = pair(&ctx, "inproc://close");
        assert!(pull.close(Duration::ZERO).is_ok());
        assert!(pull.close(Duration::ZERO).is_ok());
        assert!(pull.is_closed());
        assert_eq!(push.peer_count(), 0);
        assert_eq!(push.send_bytes(&b"x"[..]), Err(TransportError::WouldBlock));
        assert_eq!(pull.recv_multipart(), Err(TransportError::Closed));
    }

    #[test]
    fn clones_compare_equal() {
        let ctx = Context::new();
        let a = ctx.new_socket(SocketKind::Dealer);
        let b = ctx.new_socket(SocketKind::Dealer);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn poll_times_out_with_nothing_ready() {
        let ctx = Context::new();
        let (_push, pull) = pair(&ctx, "inproc://quiet");
        let start = Instant::now();
        let Ok(ready) = ctx.poll(&[(pull, Interest::READABLE)], Some(Duration::from_millis(30)))
        else {
            panic!("poll failed");
        };
        assert!(ready.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn poll_reports_readable_and_writable() {
        let ctx = Context::new();
        let (push, pull) = pair(&ctx, "inproc://both");
        assert!(push.send_bytes(&b"x"[..]).is_ok());
        let items = [
            (push.clone(), Interest::WRITABLE),
            (pull.clone(), Interest::READABLE),
        ];
        let Ok(ready) = ctx.poll(&items, Some(Duration::ZERO)) else {
            panic!("poll failed");
        };
        assert_eq!(
            ready,
            vec![(push, Readiness::WRITABLE), (pull, Readiness::READABLE)]
        );
    }

    #[test]
    fn poll_wakes_on_send_from_other_thread() {
        let ctx = Context::new();
        let (push, pull) = pair(&ctx, "inproc://wake");
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            push.send_bytes(&b"late"[..])
        });
        let Ok(ready) = ctx.poll(&[(pull.clone(), Interest::READABLE)], None) else {
            panic!("poll failed");
        };
        assert_eq!(ready, vec![(pull, Readiness::READABLE)]);
        let Ok(Ok(())) = sender.join() else {
            panic!("sender thread failed");
        };
    }
}
