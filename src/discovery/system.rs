//! [`Resolver`] backed by the host's DNS configuration.

use std::fmt;
use std::net::Ipv4Addr;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};

use super::resolver::{Resolver, SrvRecord};

/// Blocking DNS resolver using `/etc/resolv.conf` (or the platform
/// equivalent) through `hickory-resolver`.
pub struct SystemResolver {
    inner: hickory_resolver::Resolver,
}

impl SystemResolver {
    /// Creates a resolver from the system configuration.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the system configuration can not be read.
    pub fn from_system_conf() -> std::io::Result<Self> {
        let inner = hickory_resolver::Resolver::from_system_conf()?;
        Ok(Self { inner })
    }

    /// Creates a resolver with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the resolver runtime can not be started.
    pub fn new(config: ResolverConfig, options: ResolverOpts) -> std::io::Result<Self> {
        let inner = hickory_resolver::Resolver::new(config, options)?;
        Ok(Self { inner })
    }
}

impl fmt::Debug for SystemResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemResolver").finish_non_exhaustive()
    }
}

impl Resolver for SystemResolver {
    fn resolve_srv(&self, query: &str) -> Vec<SrvRecord> {
        match self.inner.srv_lookup(query) {
            Ok(lookup) => lookup
                .iter()
                .map(|srv| SrvRecord::new(srv.port(), srv.target().to_utf8()))
                .collect(),
            Err(err) => {
                tracing::debug!(query, error = %err, "SRV lookup failed");
                Vec::new()
            }
        }
    }

    fn resolve_a(&self, name: &str) -> Vec<Ipv4Addr> {
        match self.inner.ipv4_lookup(name) {
            Ok(lookup) => lookup.iter().map(|a| a.0).collect(),
            Err(err) => {
                tracing::debug!(name, error = %err, "A lookup failed");
                Vec::new()
            }
        }
    }
}
