//! DNS-driven socket pools.
//!
//! [`DiscoveredStream`] layers periodic name resolution and socket pool
//! reconciliation over an [`crate::stream::EventStream`]. Resolution goes
//! through the [`Resolver`] trait; [`StaticResolver`] answers from memory
//! and, with the `system-resolver` feature, `SystemResolver` asks the
//! host's DNS servers.

pub mod discovered_stream;
pub mod discovery_event;
pub mod resolver;
pub(crate) mod socket_pool;
#[cfg(feature = "system-resolver")]
pub mod system;

pub use discovered_stream::{DISCOVERABLE_KINDS, DiscoveredStream};
pub use discovery_event::DiscoveryEvent;
pub use resolver::{Resolver, Service, SrvRecord, StaticResolver};
#[cfg(feature = "system-resolver")]
pub use system::SystemResolver;
