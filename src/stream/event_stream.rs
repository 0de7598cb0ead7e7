//! The cooperative poll loop over sockets and timers.
//!
//! [`EventStream`] wraps a readiness poller into an endless iteration that
//! ends only when the stream is closed, either from its own thread with
//! [`EventStream::close`] or from any thread through a [`Terminator`].
//!
//! # Fairness
//!
//! All sockets found ready by one real poll are queued and handed out one
//! per call before the transport is polled again. A socket that becomes
//! ready again straight away therefore can not starve a socket that was
//! ready in the same poll but came later in the result.
//!
//! # Termination
//!
//! Each stream binds a private control socket to
//! `inproc://eventstream/term/{uuid}` and polls it with everything else.
//! [`Terminator::send_term`] connects a short-lived socket to that endpoint
//! and sends one empty message. When the control socket turns up in a
//! poll, a poison pill is queued in its place; reaching the pill closes
//! the control socket and parks the pill at the front of the queue so
//! every further call yields [`StreamEvent::Closed`] without touching the
//! transport again.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use super::event::{Item, StreamEvent};
use super::timer_queue::TimerQueue;
use crate::error::{StreamError, TransportError};
use crate::transport::{Interest, MessageSocket, Readiness, SocketKind, Transport};

/// Endpoint prefix of the per-stream control sockets.
pub const CONTROL_ENDPOINT_PREFIX: &str = "inproc://eventstream/term/";

#[derive(Debug)]
enum Queued<S> {
    Ready(S, Readiness),
    PoisonPill,
}

/// A terminable poll loop over message sockets and timers.
///
/// Not thread-safe: register, iterate and close from the thread that owns
/// the stream. Use [`EventStream::terminator`] to stop it from elsewhere.
///
/// When no timer is armed and no timeout is given, a poll blocks until a
/// socket becomes ready or a termination request arrives. That is the only
/// unbounded wait in the stream.
#[derive(Debug)]
pub struct EventStream<T: Transport> {
    transport: T,
    control: T::Socket,
    control_endpoint: String,
    sockets: Vec<(T::Socket, Interest)>,
    timers: TimerQueue,
    queued: VecDeque<Queued<T::Socket>>,
}

impl<T: Transport> EventStream<T> {
    /// Creates a stream bound to `transport`.
    ///
    /// The transport is only used to create the internal control socket;
    /// registered sockets may come from anywhere the transport can poll.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the control socket can not be
    /// created or bound.
    pub fn new(transport: T) -> Result<Self, StreamError> {
        let control_endpoint = format!("{CONTROL_ENDPOINT_PREFIX}{}", uuid::Uuid::new_v4());
        let control = transport.socket(SocketKind::Dealer)?;
        control.bind(&control_endpoint)?;
        tracing::debug!(endpoint = %control_endpoint, "event stream created");
        Ok(Self {
            transport,
            sockets: vec![(control.clone(), Interest::READABLE)],
            control,
            control_endpoint,
            timers: TimerQueue::new(),
            queued: VecDeque::new(),
        })
    }

    /// Returns the transport this stream was created with.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the endpoint of the internal control socket.
    #[must_use]
    pub fn control_endpoint(&self) -> &str {
        &self.control_endpoint
    }

    /// Returns `true` once the stream has been closed by
    /// [`EventStream::close`] or by a processed termination request.
    #[must_use]
    pub fn closed(&self) -> bool {
        matches!(self.queued.front(), Some(Queued::PoisonPill))
    }

    /// Adds a socket or timer to the loop.
    ///
    /// Registering a socket again replaces its interest set. Registering a
    /// timer that is already registered does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidInterest`] if a socket is registered
    /// with anything but readable and/or writable, or a timer with
    /// anything but [`Interest::TIMER`].
    pub fn register(&mut self, item: Item<T::Socket>, interest: Interest) -> Result<(), StreamError> {
        match item {
            Item::Timer(timer) => {
                if !interest.is_timer() {
                    return Err(StreamError::InvalidInterest {
                        interest,
                        target: "timer",
                    });
                }
                if self.timers.insert(timer) {
                    tracing::trace!(timers = self.timers.len(), "timer registered");
                }
            }
            Item::Socket(socket) => {
                if !interest.is_socket_interest() {
                    return Err(StreamError::InvalidInterest {
                        interest,
                        target: "socket",
                    });
                }
                if let Some(entry) = self.sockets.iter_mut().find(|(s, _)| *s == socket) {
                    entry.1 = interest;
                } else {
                    tracing::trace!(socket = %socket.id(), %interest, "socket registered");
                    self.sockets.push((socket, interest));
                }
            }
        }
        Ok(())
    }

    /// Removes a socket or timer from the loop.
    ///
    /// Any event already queued for the socket is dropped with it, so
    /// nothing is ever delivered for an unregistered socket.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotRegistered`] if the item is not
    /// registered.
    pub fn unregister(&mut self, item: &Item<T::Socket>) -> Result<(), StreamError> {
        match item {
            Item::Timer(timer) => {
                if !self.timers.remove(timer) {
                    return Err(StreamError::NotRegistered);
                }
            }
            Item::Socket(socket) => {
                if *socket == self.control {
                    return Err(StreamError::NotRegistered);
                }
                let Some(index) = self.sockets.iter().position(|(s, _)| s == socket) else {
                    return Err(StreamError::NotRegistered);
                };
                self.sockets.remove(index);
                self.queued
                    .retain(|queued| !matches!(queued, Queued::Ready(s, _) if s == socket));
                tracing::trace!(socket = %socket.id(), "socket unregistered");
            }
        }
        Ok(())
    }

    /// Returns `true` if the item is currently registered.
    #[must_use]
    pub fn is_registered(&self, item: &Item<T::Socket>) -> bool {
        match item {
            Item::Timer(timer) => self.timers.contains(timer),
            Item::Socket(socket) => {
                *socket != self.control && self.sockets.iter().any(|(s, _)| s == socket)
            }
        }
    }

    /// Returns the number of registered sockets, not counting the internal
    /// control socket.
    #[must_use]
    pub fn socket_count(&self) -> usize {
        self.sockets.len().saturating_sub(1)
    }

    /// Returns the number of registered timers.
    #[must_use]
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Checks whether the next call to [`EventStream::next_event`] would
    /// return without blocking, waiting up to `timeout` (`None` waits until
    /// something happens).
    ///
    /// The wait is also bounded by the soonest armed timer. Readiness is
    /// only observed, not queued.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the underlying poll fails.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<bool, StreamError> {
        if !self.queued.is_empty() {
            return Ok(true);
        }
        let next_timer = self.timers.next_delay().map(Duration::from_millis);
        let poll_timeout = match (next_timer, timeout) {
            (None, None) => None,
            (None, Some(timeout)) => Some(timeout),
            (Some(next_timer), None) => Some(next_timer),
            (Some(next_timer), Some(timeout)) => Some(next_timer.min(timeout)),
        };
        let ready = self.transport.poll(&self.sockets, poll_timeout)?;
        if !ready.is_empty() {
            return Ok(true);
        }
        Ok(self.timers.has_expired())
    }

    /// Produces the next event, blocking until one is available.
    ///
    /// Queued socket events are handed out first. With an empty queue one
    /// real poll is made, bounded by the soonest timer. An expired timer
    /// is disarmed and yielded before any sockets found ready in the same
    /// poll. Once closed, this returns [`StreamEvent::Closed`] forever.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the underlying poll fails.
    pub fn next_event(&mut self) -> Result<StreamEvent<T::Socket>, StreamError> {
        loop {
            if self.queued.is_empty() {
                let bound = self.timers.next_delay();
                tracing::trace!(bound_ms = ?bound, "polling");
                let ready = self
                    .transport
                    .poll(&self.sockets, bound.map(Duration::from_millis))?;
                self.enqueue(ready);
                if (bound == Some(0) || self.queued.is_empty())
                    && let Some(timer) = self.timers.pop_expired()
                {
                    tracing::trace!("timer fired");
                    return Ok(StreamEvent::Timer(timer));
                }
            }
            match self.queued.pop_front() {
                Some(Queued::Ready(socket, readiness)) => {
                    return Ok(StreamEvent::Ready { socket, readiness });
                }
                Some(Queued::PoisonPill) => {
                    self.close_control();
                    self.queued.push_front(Queued::PoisonPill);
                    return Ok(StreamEvent::Closed);
                }
                // The poll returned early; go round again.
                None => {}
            }
        }
    }

    fn enqueue(&mut self, ready: Vec<(T::Socket, Readiness)>) {
        for (socket, readiness) in ready {
            if socket == self.control {
                tracing::debug!(endpoint = %self.control_endpoint, "termination received");
                self.queued.push_back(Queued::PoisonPill);
            } else {
                self.queued.push_back(Queued::Ready(socket, readiness));
            }
        }
    }

    fn close_control(&self) {
        if self.control.is_closed() {
            return;
        }
        if let Err(err) = self.control.close(Duration::ZERO) {
            tracing::warn!(error = %err, "failed to close control socket");
        }
    }

    /// Closes the stream from its own thread.
    ///
    /// Releases the control socket and makes every further call to
    /// [`EventStream::next_event`] yield [`StreamEvent::Closed`]. Calling
    /// it again does nothing.
    pub fn close(&mut self) {
        if self.closed() {
            return;
        }
        self.queued.push_front(Queued::PoisonPill);
        self.close_control();
        tracing::debug!(endpoint = %self.control_endpoint, "event stream closed");
    }

    /// Returns a handle that can terminate this stream from any thread.
    #[must_use]
    pub fn terminator(&self) -> Terminator<T> {
        Terminator {
            transport: self.transport.clone(),
            endpoint: self.control_endpoint.clone(),
        }
    }

    /// Asks the stream to terminate. Same as
    /// `self.terminator().send_term()`.
    ///
    /// # Errors
    ///
    /// See [`Terminator::send_term`].
    pub fn send_term(&self) -> Result<(), StreamError> {
        self.terminator().send_term()
    }
}

impl<T: Transport> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> Iterator for EventStream<T> {
    type Item = Result<StreamEvent<T::Socket>, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(StreamEvent::Closed) => None,
            other => Some(other),
        }
    }
}

/// Cross-thread termination handle for an [`EventStream`].
///
/// Holds only the transport and the control endpoint, never the stream
/// itself, so it can be cloned and moved freely (for example into a
/// signal handler thread).
#[derive(Debug, Clone)]
pub struct Terminator<T: Transport> {
    transport: T,
    endpoint: String,
}

impl<T: Transport> Terminator<T> {
    /// Signals the stream to terminate.
    ///
    /// The stream notices on its next poll, or at once if it is blocked in
    /// one. Safe to call repeatedly and after the stream has closed.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the short-lived signalling
    /// socket can not be created, connected or closed.
    pub fn send_term(&self) -> Result<(), StreamError> {
        let socket = self.transport.socket(SocketKind::Dealer)?;
        socket.connect(&self.endpoint)?;
        let sent = socket.send(vec![Bytes::new()]);
        socket.close(Duration::ZERO)?;
        match sent {
            Ok(()) => {
                tracing::debug!(endpoint = %self.endpoint, "termination requested");
                Ok(())
            }
            // Nobody listens on a closed stream's control endpoint.
            Err(TransportError::WouldBlock) => {
                tracing::debug!(endpoint = %self.endpoint, "stream already closed");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::stream::Timer;
    use crate::transport::inproc::{Context, Socket};
    use std::thread;
    use std::time::Instant;

    fn new_stream(ctx: &Context) -> EventStream<Context> {
        let Ok(stream) = EventStream::new(ctx.clone()) else {
            panic!("failed to create stream");
        };
        stream
    }

    fn push_pull(ctx: &Context, endpoint: &str) -> (Socket, Socket) {
        let push = ctx.new_socket(SocketKind::Push);
        let pull = ctx.new_socket(SocketKind::Pull);
        let (Ok(()), Ok(())) = (push.bind(endpoint), pull.connect(endpoint)) else {
            panic!("failed to link sockets");
        };
        (push, pull)
    }

    fn expect_ready(stream: &mut EventStream<Context>) -> (Socket, Readiness) {
        let Ok(StreamEvent::Ready { socket, readiness }) = stream.next_event() else {
            panic!("expected a ready socket");
        };
        (socket, readiness)
    }

    #[test]
    fn single_socket_readable() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (push, pull) = push_pull(&ctx, "inproc://single");
        assert!(stream.register(Item::Socket(pull.clone()), Interest::READABLE).is_ok());
        assert!(push.send_bytes(&b"ping"[..]).is_ok());
        let (socket, readiness) = expect_ready(&mut stream);
        assert_eq!(socket, pull);
        assert_eq!(readiness, Readiness::READABLE);
    }

    #[test]
    fn multiple_sockets_writable() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (a, _pull_a) = push_pull(&ctx, "inproc://w-a");
        let (b, _pull_b) = push_pull(&ctx, "inproc://w-b");
        assert!(stream.register(Item::Socket(a.clone()), Interest::WRITABLE).is_ok());
        assert!(stream.register(Item::Socket(b.clone()), Interest::WRITABLE).is_ok());
        let (first, readiness) = expect_ready(&mut stream);
        assert_eq!(readiness, Readiness::WRITABLE);
        let (second, _) = expect_ready(&mut stream);
        assert_eq!(first, a);
        assert_eq!(second, b);
    }

    #[test]
    fn reregistering_socket_replaces_interest() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (push, _pull) = push_pull(&ctx, "inproc://rereg");
        assert!(stream.register(Item::Socket(push.clone()), Interest::READABLE).is_ok());
        assert!(stream.register(Item::Socket(push.clone()), Interest::WRITABLE).is_ok());
        assert_eq!(stream.socket_count(), 1);
        let (socket, readiness) = expect_ready(&mut stream);
        assert_eq!(socket, push);
        assert_eq!(readiness, Readiness::WRITABLE);
    }

    #[test]
    fn invalid_interest_rejected_at_registration() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let socket = ctx.new_socket(SocketKind::Pull);
        let result = stream.register(Item::Socket(socket.clone()), Interest::TIMER);
        assert!(matches!(result, Err(StreamError::InvalidInterest { target: "socket", .. })));
        let result = stream.register(Item::Socket(socket), Interest::READABLE | Interest::TIMER);
        assert!(matches!(result, Err(StreamError::InvalidInterest { .. })));
        let result = stream.register(Item::Timer(Timer::new()), Interest::READABLE);
        assert!(matches!(result, Err(StreamError::InvalidInterest { target: "timer", .. })));
        assert_eq!(stream.socket_count(), 0);
        assert_eq!(stream.timer_count(), 0);
    }

    #[test]
    fn unregister_unknown_item_fails() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let socket = Item::Socket(ctx.new_socket(SocketKind::Pull));
        assert!(matches!(stream.unregister(&socket), Err(StreamError::NotRegistered)));
        let timer = Item::Timer(Timer::new());
        assert!(matches!(stream.unregister(&timer), Err(StreamError::NotRegistered)));
    }

    #[test]
    fn unregister_stops_events() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (push, pull) = push_pull(&ctx, "inproc://unreg");
        let item = Item::Socket(pull.clone());
        assert!(stream.register(item.clone(), Interest::READABLE).is_ok());
        assert!(stream.is_registered(&item));
        assert!(stream.unregister(&item).is_ok());
        assert!(!stream.is_registered(&item));
        assert!(push.send_bytes(&b"x"[..]).is_ok());
        assert!(matches!(stream.poll(Some(Duration::ZERO)), Ok(false)));
    }

    #[test]
    fn unregister_purges_queued_events() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (push_a, pull_a) = push_pull(&ctx, "inproc://purge-a");
        let (push_b, pull_b) = push_pull(&ctx, "inproc://purge-b");
        assert!(stream.register(Item::Socket(pull_a.clone()), Interest::READABLE).is_ok());
        assert!(stream.register(Item::Socket(pull_b.clone()), Interest::READABLE).is_ok());
        assert!(push_a.send_bytes(&b"a"[..]).is_ok());
        assert!(push_b.send_bytes(&b"b"[..]).is_ok());

        let (first, _) = expect_ready(&mut stream);
        assert_eq!(first, pull_a);
        // pull_b is queued now; unregistering must drop that event.
        assert!(stream.unregister(&Item::Socket(pull_b)).is_ok());
        let (next, _) = expect_ready(&mut stream);
        assert_eq!(next, pull_a);
    }

    #[test]
    fn queued_events_are_drained_fairly() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (push_a, pull_a) = push_pull(&ctx, "inproc://fair-a");
        let (push_b, pull_b) = push_pull(&ctx, "inproc://fair-b");
        assert!(stream.register(Item::Socket(pull_a.clone()), Interest::READABLE).is_ok());
        assert!(stream.register(Item::Socket(pull_b.clone()), Interest::READABLE).is_ok());
        assert!(push_a.send_bytes(&b"a1"[..]).is_ok());
        assert!(push_a.send_bytes(&b"a2"[..]).is_ok());
        assert!(push_b.send_bytes(&b"b1"[..]).is_ok());

        let (first, _) = expect_ready(&mut stream);
        assert_eq!(first, pull_a);
        assert!(pull_a.recv_multipart().is_ok());
        // pull_a is still readable, but pull_b was ready in the same poll.
        let (second, _) = expect_ready(&mut stream);
        assert_eq!(second, pull_b);
        let (third, _) = expect_ready(&mut stream);
        assert_eq!(third, pull_a);
    }

    #[test]
    fn poll_ready_and_wait() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (push, pull) = push_pull(&ctx, "inproc://poll");
        assert!(stream.register(Item::Socket(pull), Interest::READABLE).is_ok());

        let start = Instant::now();
        assert!(matches!(stream.poll(Some(Duration::from_millis(20))), Ok(false)));
        assert!(start.elapsed() >= Duration::from_millis(20));

        assert!(push.send_bytes(&b"x"[..]).is_ok());
        assert!(matches!(stream.poll(Some(Duration::ZERO)), Ok(true)));
    }

    #[test]
    fn poll_is_bounded_by_timer_without_timeout() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let timer = Timer::new();
        assert!(stream.register(Item::Timer(timer.clone()), Interest::TIMER).is_ok());
        timer.schedule(10);
        let start = Instant::now();
        let Ok(ready) = stream.poll(None) else {
            panic!("poll failed");
        };
        assert!(start.elapsed() < Duration::from_secs(5));
        if !ready {
            // The poll may return a hair before the deadline.
            assert!(matches!(stream.poll(Some(Duration::from_millis(5))), Ok(true)));
        }
    }

    #[test]
    fn poll_uses_sooner_of_timeout_and_timer() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let timer = Timer::new();
        assert!(stream.register(Item::Timer(timer.clone()), Interest::TIMER).is_ok());

        timer.schedule(30);
        let start = Instant::now();
        let Ok(ready) = stream.poll(Some(Duration::from_secs(5))) else {
            panic!("poll failed");
        };
        assert!(start.elapsed() < Duration::from_secs(1));
        if !ready {
            assert!(matches!(stream.poll(Some(Duration::from_millis(5))), Ok(true)));
        }

        timer.schedule(5000);
        let start = Instant::now();
        assert!(matches!(stream.poll(Some(Duration::from_millis(20))), Ok(false)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn unscheduled_timer_does_not_fire() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let timer = Timer::new();
        assert!(stream.register(Item::Timer(timer), Interest::TIMER).is_ok());
        assert!(matches!(stream.poll(Some(Duration::from_millis(10))), Ok(false)));
    }

    #[test]
    fn poll_after_close_is_ready() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        stream.close();
        assert!(matches!(stream.poll(None), Ok(true)));
    }

    #[test]
    fn timer_fires_once_after_delay() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (_push, pull) = push_pull(&ctx, "inproc://quiet");
        assert!(stream.register(Item::Socket(pull), Interest::READABLE).is_ok());
        let timer = Timer::new();
        assert!(stream.register(Item::Timer(timer.clone()), Interest::TIMER).is_ok());

        let start = Instant::now();
        timer.schedule(50);
        let Ok(StreamEvent::Timer(fired)) = stream.next_event() else {
            panic!("expected the timer");
        };
        let elapsed = start.elapsed();
        assert_eq!(fired, timer);
        assert!(!timer.is_active());
        assert!(elapsed >= Duration::from_millis(49));
        assert!(elapsed < Duration::from_secs(2));
        assert!(stream.is_registered(&Item::Timer(timer)));
        assert!(matches!(stream.poll(Some(Duration::from_millis(10))), Ok(false)));
    }

    #[test]
    fn rescheduled_timer_fires_again() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let timer = Timer::new();
        assert!(stream.register(Item::Timer(timer.clone()), Interest::TIMER).is_ok());
        for _ in 0..2 {
            timer.schedule(1);
            let Ok(StreamEvent::Timer(fired)) = stream.next_event() else {
                panic!("expected the timer");
            };
            assert_eq!(fired, timer);
        }
    }

    #[test]
    fn registering_timer_twice_is_noop() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let timer = Timer::new();
        assert!(stream.register(Item::Timer(timer.clone()), Interest::TIMER).is_ok());
        assert!(stream.register(Item::Timer(timer.clone()), Interest::TIMER).is_ok());
        assert_eq!(stream.timer_count(), 1);
        timer.schedule(0);
        assert!(matches!(stream.next_event(), Ok(StreamEvent::Timer(_))));
        assert!(matches!(stream.poll(Some(Duration::from_millis(5))), Ok(false)));
    }

    #[test]
    fn timers_fire_soonest_first() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let late = Timer::new();
        let soon = Timer::new();
        assert!(stream.register(Item::Timer(late.clone()), Interest::TIMER).is_ok());
        assert!(stream.register(Item::Timer(soon.clone()), Interest::TIMER).is_ok());
        late.schedule(30);
        soon.schedule(10);
        let Ok(StreamEvent::Timer(first)) = stream.next_event() else {
            panic!("expected a timer");
        };
        let Ok(StreamEvent::Timer(second)) = stream.next_event() else {
            panic!("expected a timer");
        };
        assert_eq!(first, soon);
        assert_eq!(second, late);
    }

    #[test]
    fn unregistered_timer_never_fires() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let timer = Timer::new();
        let item = Item::Timer(timer.clone());
        assert!(stream.register(item.clone(), Interest::TIMER).is_ok());
        timer.schedule(0);
        assert!(stream.unregister(&item).is_ok());
        assert!(matches!(stream.poll(Some(Duration::from_millis(5))), Ok(false)));
    }

    #[test]
    fn expired_timer_comes_before_ready_sockets() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (push, pull) = push_pull(&ctx, "inproc://timer-first");
        assert!(stream.register(Item::Socket(pull.clone()), Interest::READABLE).is_ok());
        let timer = Timer::new();
        assert!(stream.register(Item::Timer(timer.clone()), Interest::TIMER).is_ok());
        assert!(push.send_bytes(&b"x"[..]).is_ok());
        timer.schedule(0);
        assert!(matches!(stream.next_event(), Ok(StreamEvent::Timer(_))));
        let (socket, _) = expect_ready(&mut stream);
        assert_eq!(socket, pull);
    }

    #[test]
    fn close_is_idempotent_and_sticky() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let endpoint = stream.control_endpoint().to_string();
        assert!(!stream.closed());
        stream.close();
        stream.close();
        assert!(stream.closed());
        assert!(!ctx.is_bound(&endpoint));
        for _ in 0..3 {
            assert!(matches!(stream.next_event(), Ok(StreamEvent::Closed)));
        }
        assert!(stream.next().is_none());
    }

    #[test]
    fn send_term_closes_stream() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        assert!(stream.send_term().is_ok());
        assert!(stream.send_term().is_ok());
        assert!(matches!(stream.next_event(), Ok(StreamEvent::Closed)));
        assert!(stream.closed());
        assert!(matches!(stream.next_event(), Ok(StreamEvent::Closed)));
        // Terminating a closed stream is still fine.
        assert!(stream.send_term().is_ok());
    }

    #[test]
    fn send_term_from_other_thread_unblocks_next() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (_push, pull) = push_pull(&ctx, "inproc://blocked");
        assert!(stream.register(Item::Socket(pull), Interest::READABLE).is_ok());
        let terminator = stream.terminator();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            terminator.send_term()
        });
        let start = Instant::now();
        assert!(matches!(stream.next_event(), Ok(StreamEvent::Closed)));
        assert!(start.elapsed() >= Duration::from_millis(25));
        let Ok(Ok(())) = handle.join() else {
            panic!("terminator thread failed");
        };
    }

    #[test]
    fn iterator_ends_at_termination() {
        let ctx = Context::new();
        let mut stream = new_stream(&ctx);
        let (push, pull) = push_pull(&ctx, "inproc://iter");
        assert!(stream.register(Item::Socket(pull.clone()), Interest::READABLE).is_ok());
        assert!(push.send_bytes(&b"x"[..]).is_ok());
        let mut seen = 0;
        for event in stream.by_ref() {
            let Ok(StreamEvent::Ready { socket, .. }) = event else {
                panic!("expected a ready socket");
            };
            assert!(socket.recv_multipart().is_ok());
            seen += 1;
            if seen == 3 {
                break;
            }
            assert!(push.send_bytes(&b"y"[..]).is_ok());
        }
        assert_eq!(seen, 3);
        assert!(stream.send_term().is_ok());
        assert!(stream.next().is_none());
    }

    #[test]
    fn drop_releases_control_socket() {
        let ctx = Context::new();
        let stream = new_stream(&ctx);
        let endpoint = stream.control_endpoint().to_string();
        assert!(ctx.is_bound(&endpoint));
        drop(stream);
        assert!(!ctx.is_bound(&endpoint));
    }
}
