//! # zkit
//!
//! Cancellable event loops over message sockets and timers.
//!
//! A process waits on many message-queue sockets and software timers
//! through one iteration that any thread can stop. On top of that loop a
//! socket pool can follow a DNS name, connecting to endpoints as they are
//! advertised and dropping them as they disappear.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!     │
//!     ├── DiscoveredStream (discovery/)   FOUND / LOST / ready sockets
//!     ├── MessageStream (stream/)         received frames / timers
//!     │
//!     ├── EventStream (stream/)           readiness / timers / closed
//!     │       ├── TimerQueue + Timer
//!     │       └── control socket  ◄── Terminator::send_term (any thread)
//!     │
//!     ├── Transport + MessageSocket (transport/)
//!     │       ├── inproc::Context (in-process reference transport)
//!     │       └── zeromq::ZmqContext (feature `zmq-transport`)
//!     │
//!     └── Resolver (discovery/)
//!             ├── StaticResolver
//!             └── SystemResolver (feature `system-resolver`)
//! ```
//!
//! ## Example
//!
//! ```
//! use zkit::stream::{Item, MessageStream, StreamMessage};
//! use zkit::transport::{MessageSocket, SocketKind};
//! use zkit::transport::inproc::Context;
//!
//! # fn main() -> Result<(), zkit::error::StreamError> {
//! let ctx = Context::new();
//! let push = ctx.new_socket(SocketKind::Push);
//! let pull = ctx.new_socket(SocketKind::Pull);
//! push.bind("inproc://jobs")?;
//! pull.connect("inproc://jobs")?;
//!
//! let mut stream = MessageStream::new(ctx)?;
//! stream.register(Item::Socket(pull))?;
//! push.send_bytes("hello")?;
//!
//! let StreamMessage::Frames(frames) = stream.next_event()? else {
//!     unreachable!();
//! };
//! assert_eq!(frames, vec![bytes::Bytes::from_static(b"hello")]);
//!
//! stream.send_term()?;
//! assert_eq!(stream.next_event()?, StreamMessage::Closed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod stream;
pub mod transport;
