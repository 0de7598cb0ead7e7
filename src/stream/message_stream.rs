//! Message-level view of an [`EventStream`].
//!
//! [`MessageStream`] registers sockets for readability only and turns each
//! readable event into the multipart message received from that socket.
//! Expired timers come through as the timer itself. The cost of the
//! simpler API is that the receiving socket is not reported and write
//! readiness is not available; use [`EventStream`] when either matters.

use std::time::Duration;

use super::event::{Item, StreamEvent};
use super::event_stream::{EventStream, Terminator};
use super::timer::Timer;
use crate::error::StreamError;
use crate::transport::{Frames, Interest, MessageSocket, Transport};

/// One step of a message stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// A multipart message received from one of the registered sockets.
    Frames(Frames),
    /// A registered timer expired.
    Timer(Timer),
    /// The stream is closed.
    Closed,
}

/// A terminable stream of received messages and expired timers.
#[derive(Debug)]
pub struct MessageStream<T: Transport> {
    events: EventStream<T>,
}

impl<T: Transport> MessageStream<T> {
    /// Creates a message stream bound to `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the inner event stream can not
    /// be created.
    pub fn new(transport: T) -> Result<Self, StreamError> {
        Ok(Self::with_event_stream(EventStream::new(transport)?))
    }

    /// Wraps an existing event stream. Registrations already made on it
    /// are kept; they should be readable or timer registrations.
    #[must_use]
    pub fn with_event_stream(events: EventStream<T>) -> Self {
        Self { events }
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

    /// Registers a socket for incoming messages, or a timer.
    ///
    /// # Errors
    ///
    /// Never fails for well-formed items; the error type is shared with
    /// [`EventStream::register`].
    pub fn register(&mut self, item: Item<T::Socket>) -> Result<(), StreamError> {
        let interest = match item {
            Item::Timer(_) => Interest::TIMER,
            Item::Socket(_) => Interest::READABLE,
        };
        self.events.register(item, interest)
    }

    /// Stops receiving from a socket, or removes a timer.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotRegistered`] if the item is not
    /// registered.
    pub fn unregister(&mut self, item: &Item<T::Socket>) -> Result<(), StreamError> {
        self.events.unregister(item)
    }

    /// Checks whether a message or timer is ready; see
    /// [`EventStream::poll`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the underlying poll fails.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<bool, StreamError> {
        self.events.poll(timeout)
    }

    /// Produces the next message, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if polling or receiving fails,
    /// and [`StreamError::UnexpectedEvent`] if the inner stream reports a
    /// socket that is not readable, which only happens when a socket was
    /// registered for writability directly on the inner stream.
    pub fn next_event(&mut self) -> Result<StreamMessage, StreamError> {
        match self.events.next_event()? {
            StreamEvent::Ready { socket, readiness } if readiness.readable => {
                Ok(StreamMessage::Frames(socket.recv_multipart()?))
            }
            event @ StreamEvent::Ready { .. } => Err(StreamError::UnexpectedEvent(format!(
                "{} event from a message stream",
                event.event_type_str()
            ))),
            StreamEvent::Timer(timer) => Ok(StreamMessage::Timer(timer)),
            StreamEvent::Closed => Ok(StreamMessage::Closed),
        }
    }

    /// Closes the stream; see [`EventStream::close`].
    pub fn close(&mut self) {
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

impl<T: Transport> Iterator for MessageStream<T> {
    type Item = Result<StreamMessage, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(StreamMessage::Closed) => None,
            other => Some(other),
        }
    }
}
