//! Event and message streams over message sockets and timers.
//!
//! - [`Timer`]: restartable one-shot countdown, registered like a socket.
//! - [`EventStream`]: readiness events for sockets plus expired timers.
//! - [`MessageStream`]: the received messages themselves instead of
//!   readiness.

pub mod event;
pub mod event_stream;
pub mod message_stream;
pub mod timer;
pub(crate) mod timer_queue;

pub use event::{Item, StreamEvent};
pub use event_stream::{EventStream, Terminator};
pub use message_stream::{MessageStream, StreamMessage};
pub use timer::{Timer, TimerKey};
