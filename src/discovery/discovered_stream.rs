//! A socket pool that follows DNS.
//!
//! [`DiscoveredStream`] keeps one connected socket per endpoint advertised
//! for a DNS name, plus any endpoints pinned by hand, and reports pool
//! changes as [`DiscoveryEvent::Found`] and [`DiscoveryEvent::Lost`]
//! interleaved with ordinary readiness events.
//!
//! # Discovery rounds
//!
//! An internal timer, registered with the inner [`EventStream`], triggers
//! each round. A round:
//!
//! 1. resolves the name: a numeric service resolves the name's A records
//!    and pairs them with that port; a symbolic service resolves the SRV
//!    record `_{service}._tcp.{name}` and then each target's A records;
//! 2. adds the pinned endpoints;
//! 3. closes and forgets every live endpoint that is no longer wanted
//!    (`Lost`), then connects every wanted endpoint that is not live yet
//!    (`Found`);
//! 4. re-arms the timer for the configured interval.
//!
//! Lookup failures count as empty answers. An endpoint that can not be
//! connected is logged and left out of the pool, so the next round tries
//! it again. The events of a round are handed out one per call before the
//! inner stream is polled again.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use super::discovery_event::DiscoveryEvent;
use super::resolver::{Resolver, Service};
use super::socket_pool::SocketPool;
use crate::config::DiscoveryConfig;
use crate::error::StreamError;
use crate::stream::{EventStream, Item, StreamEvent, Terminator, Timer};
use crate::transport::{Interest, MessageSocket, SocketKind, Transport};

/// Socket kinds a pool may manage: connect-only patterns.
pub const DISCOVERABLE_KINDS: [SocketKind; 3] =
    [SocketKind::Req, SocketKind::Pull, SocketKind::Sub];

/// A stream over a DNS-discovered pool of sockets.
///
/// Like [`EventStream`] it is driven from one thread; only
/// [`Terminator::send_term`] may be called from elsewhere. The pool owns
/// every socket it creates: read from them, but never close them
/// directly.
#[derive(Debug)]
pub struct DiscoveredStream<T: Transport, R: Resolver> {
    events: EventStream<T>,
    resolver: R,
    kind: SocketKind,
    name: Option<String>,
    service: Service,
    interval_ms: u64,
    timer: Timer,
    pinned: BTreeSet<String>,
    pool: SocketPool<T::Socket>,
    pending: VecDeque<DiscoveryEvent<T::Socket>>,
}

impl<T: Transport, R: Resolver> DiscoveredStream<T, R> {
    /// Creates a pool of `kind` sockets for the endpoints of `name` and
    /// `service`, looked up again every `interval_ms` milliseconds.
    ///
    /// A `name` of `None` or `""` disables DNS; only endpoints added with
    /// [`DiscoveredStream::add_endpoint`] are used. The first round runs
    /// on the first call to [`DiscoveredStream::next_event`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnsupportedSocketKind`] unless `kind` is
    /// `Req`, `Pull` or `Sub`, and [`StreamError::Transport`] if the
    /// inner event stream can not be created.
    pub fn new(
        transport: T,
        kind: SocketKind,
        name: Option<String>,
        service: Service,
        interval_ms: u64,
        resolver: R,
    ) -> Result<Self, StreamError> {
        if !DISCOVERABLE_KINDS.contains(&kind) {
            return Err(StreamError::UnsupportedSocketKind(kind));
        }
        let mut events = EventStream::new(transport)?;
        let timer = Timer::new();
        events.register(Item::Timer(timer.clone()), Interest::TIMER)?;
        timer.schedule(0);
        Ok(Self {
            events,
            resolver,
            kind,
            name: name.filter(|n| !n.is_empty()),
            service,
            interval_ms,
            timer,
            pinned: BTreeSet::new(),
            pool: SocketPool::new(),
            pending: VecDeque::new(),
        })
    }

    /// Creates a pool from a loaded [`DiscoveryConfig`], pinning its
    /// endpoints.
    ///
    /// # Errors
    ///
    /// See [`DiscoveredStream::new`].
    pub fn from_config(
        transport: T,
        config: &DiscoveryConfig,
        resolver: R,
    ) -> Result<Self, StreamError> {
        let mut stream = Self::new(
            transport,
            config.socket_kind,
            config.name.clone(),
            config.service.clone(),
            config.interval_ms,
            resolver,
        )?;
        stream.pinned.extend(config.endpoints.iter().cloned());
        Ok(stream)
    }

    /// Returns the kind of the pool's sockets.
    #[must_use]
    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Returns the DNS name being followed, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the service being resolved.
    #[must_use]
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Returns the milliseconds between discovery rounds.
    #[must_use]
    pub fn interval(&self) -> u64 {
        self.interval_ms
    }

    /// Changes the milliseconds between discovery rounds. Takes effect
    /// when the next round re-arms the timer.
    pub fn set_interval(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    /// Returns the endpoints with a live socket, in lexical order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.pool.endpoints()
    }

    /// Returns the pinned endpoints, in lexical order.
    #[must_use]
    pub fn pinned_endpoints(&self) -> Vec<String> {
        self.pinned.iter().cloned().collect()
    }

    /// Returns the inner event stream.
    #[must_use]
    pub fn event_stream(&self) -> &EventStream<T> {
        &self.events
    }

    /// Returns `true` once the stream is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.events.closed()
    }

    /// Pins an endpoint and runs a discovery round on the next call to
    /// [`DiscoveredStream::next_event`], whatever the interval.
    pub fn add_endpoint(&mut self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        tracing::debug!(endpoint = %endpoint, "endpoint pinned");
        self.pinned.insert(endpoint);
        self.timer.schedule(0);
    }

    /// Unpins an endpoint and runs a discovery round on the next call to
    /// [`DiscoveredStream::next_event`].
    ///
    /// An endpoint that DNS still advertises stays connected.
    pub fn remove_endpoint(&mut self, endpoint: &str) {
        if self.pinned.remove(endpoint) {
            tracing::debug!(endpoint, "endpoint unpinned");
        }
        self.timer.schedule(0);
    }

    /// Registers a socket of the caller's with the inner stream. Its
    /// readiness comes through as [`DiscoveryEvent::Ready`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::PoolSocket`] for a socket the pool created,
    /// and [`StreamError::InvalidInterest`] unless `interest` is readable
    /// and/or writable.
    pub fn register(&mut self, socket: T::Socket, interest: Interest) -> Result<(), StreamError> {
        if self.pool.holds(&socket) {
            return Err(StreamError::PoolSocket);
        }
        self.events.register(Item::Socket(socket), interest)
    }

    /// Unregisters a socket of the caller's.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::PoolSocket`] for a socket the pool created,
    /// and [`StreamError::NotRegistered`] if the socket is not registered.
    pub fn unregister(&mut self, socket: &T::Socket) -> Result<(), StreamError> {
        if self.pool.holds(socket) {
            return Err(StreamError::PoolSocket);
        }
        self.events.unregister(&Item::Socket(socket.clone()))
    }

    /// Checks whether the next call to [`DiscoveredStream::next_event`]
    /// has something to start from; see [`EventStream::poll`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the underlying poll fails.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<bool, StreamError> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        self.events.poll(timeout)
    }

    /// Produces the next event, running discovery rounds as their timer
    /// expires. Blocks until an event is available.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if polling fails, and
    /// [`StreamError::UnexpectedEvent`] if a timer other than the
    /// discovery timer expires. Endpoints that fail to connect are logged
    /// and retried on the next round rather than reported here.
    pub fn next_event(&mut self) -> Result<DiscoveryEvent<T::Socket>, StreamError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            match self.events.next_event()? {
                StreamEvent::Ready { socket, readiness } => {
                    return Ok(DiscoveryEvent::Ready { socket, readiness });
                }
                StreamEvent::Timer(timer) if timer == self.timer => {
                    self.discover();
                    self.timer.schedule(self.interval_ms);
                }
                StreamEvent::Timer(_) => {
                    return Err(StreamError::UnexpectedEvent(
                        "foreign timer in a discovered stream".to_string(),
                    ));
                }
                StreamEvent::Closed => return Ok(DiscoveryEvent::Closed),
            }
        }
    }

    /// Desired endpoints for this round.
    fn resolve(&self) -> BTreeSet<String> {
        let mut endpoints = self.pinned.clone();
        if let Some(name) = &self.name {
            let targets: Vec<(u16, String)> = match self.service.srv_query(name) {
                Some(query) => self
                    .resolver
                    .resolve_srv(&query)
                    .into_iter()
                    .map(|record| (record.port, record.target))
                    .collect(),
                None => self
                    .service
                    .port()
                    .map(|port| (port, name.clone()))
                    .into_iter()
                    .collect(),
            };
            for (port, target) in targets {
                for addr in self.resolver.resolve_a(&target) {
                    endpoints.insert(format!("tcp://{addr}:{port}"));
                }
            }
        }
        if endpoints.is_empty() {
            tracing::warn!(
                name = ?self.name,
                service = %self.service,
                "could not find any endpoints"
            );
        }
        endpoints
    }

    fn discover(&mut self) {
        let desired = self.resolve();
        let diff = self.pool.diff(&desired);
        tracing::trace!(
            desired = desired.len(),
            live = self.pool.len(),
            lost = diff.lost.len(),
            found = diff.found.len(),
            "discovery round"
        );
        if diff.is_empty() {
            return;
        }

        for endpoint in diff.lost {
            let Some(socket) = self.pool.remove(&endpoint) else {
                continue;
            };
            if let Err(err) = socket.close(Duration::ZERO) {
                tracing::warn!(endpoint = %endpoint, error = %err, "failed to close lost socket");
            }
            if let Err(err) = self.events.unregister(&Item::Socket(socket.clone())) {
                tracing::warn!(endpoint = %endpoint, error = %err, "lost socket was not registered");
            }
            tracing::info!(endpoint = %endpoint, "lost connection");
            self.pending.push_back(DiscoveryEvent::Lost(socket));
        }

        for endpoint in diff.found {
            match self.connect(&endpoint) {
                Ok(socket) => {
                    tracing::info!(endpoint = %endpoint, socket = %socket.id(), "established connection");
                    self.pool.insert(endpoint, socket.clone());
                    self.pending.push_back(DiscoveryEvent::Found(socket));
                }
                Err(err) => {
                    tracing::warn!(endpoint = %endpoint, error = %err, "failed to connect endpoint");
                }
            }
        }
    }

    /// Opens a registered socket connected to `endpoint`. On failure the
    /// socket is closed again before the error is returned.
    fn connect(&mut self, endpoint: &str) -> Result<T::Socket, StreamError> {
        let socket = self.events.transport().socket(self.kind)?;
        let linked = socket.connect(endpoint).map_err(StreamError::from).and_then(|()| {
            self.events
                .register(Item::Socket(socket.clone()), Interest::READABLE)
        });
        if let Err(err) = linked {
            if let Err(close_err) = socket.close(Duration::ZERO) {
                tracing::warn!(endpoint, error = %close_err, "failed to close unconnected socket");
            }
            return Err(err);
        }
        Ok(socket)
    }

    /// Closes every pool socket and then the inner stream. Calling it
    /// again does nothing.
    pub fn close(&mut self) {
        let _ = self.events.unregister(&Item::Timer(self.timer.clone()));
        self.timer.cancel();
        for (endpoint, socket) in self.pool.drain() {
            if let Err(err) = socket.close(Duration::ZERO) {
                tracing::warn!(endpoint = %endpoint, error = %err, "failed to close pool socket");
            }
            let _ = self.events.unregister(&Item::Socket(socket));
        }
        self.pending.clear();
        self.events.close();
    }

    /// Returns a cross-thread termination handle.
    #[must_use]
    pub fn terminator(&self) -> Terminator<T> {
        self.events.terminator()
    }

    /// Asks the stream to terminate; see [`Terminator::send_term`].
    ///
    /// # Errors
    ///
    /// See [`Terminator::send_term`].
    pub fn send_term(&self) -> Result<(), StreamError> {
        self.events.send_term()
    }
}

impl<T: Transport, R: Resolver> Drop for DiscoveredStream<T, R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport, R: Resolver> Iterator for DiscoveredStream<T, R> {
    type Item = Result<DiscoveryEvent<T::Socket>, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(DiscoveryEvent::Closed) => None,
            other => Some(other),
        }
    }
}
