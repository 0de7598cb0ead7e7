//! Name resolution used by discovered pools.
//!
//! A [`Resolver`] answers SRV and A queries. Lookups never fail: a
//! timeout, `NXDOMAIN` or an empty answer all come back as an empty list,
//! and implementations log the cause at debug level.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One SRV answer: a target host and the port it serves on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SrvRecord {
    /// Port of the service on `target`.
    pub port: u16,
    /// Host name to resolve to addresses.
    pub target: String,
}

impl SrvRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(port: u16, target: impl Into<String>) -> Self {
        Self {
            port,
            target: target.into(),
        }
    }
}

/// The service part of a discovery query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Service {
    /// A fixed port; the name is resolved straight to addresses.
    Port(u16),
    /// A symbolic service looked up as `_{service}._tcp.{name}`.
    Named(String),
}

impl Service {
    /// Returns the SRV query for this service under `name`, or `None` for
    /// a fixed port.
    #[must_use]
    pub fn srv_query(&self, name: &str) -> Option<String> {
        match self {
            Self::Port(_) => None,
            Self::Named(service) => Some(format!("_{service}._tcp.{name}")),
        }
    }

    /// Returns the fixed port, or `None` for a symbolic service.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        match self {
            Self::Port(port) => Some(*port),
            Self::Named(_) => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(port) => write!(f, "{port}"),
            Self::Named(service) => f.write_str(service),
        }
    }
}

impl FromStr for Service {
    type Err = String;

    /// All-digit strings that fit a port are [`Service::Port`]; anything
    /// else non-empty is [`Service::Named`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty service".to_string());
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u16>()
                .map(Self::Port)
                .map_err(|_| format!("port out of range: {s}"));
        }
        Ok(Self::Named(s.to_string()))
    }
}

impl From<u16> for Service {
    fn from(port: u16) -> Self {
        Self::Port(port)
    }
}

/// SRV and A record lookups.
pub trait Resolver: fmt::Debug {
    /// Resolves an SRV query such as `_zkit._tcp.example.com`.
    ///
    /// Returns an empty list when the lookup fails for any reason.
    fn resolve_srv(&self, query: &str) -> Vec<SrvRecord>;

    /// Resolves a host name to its IPv4 addresses.
    ///
    /// Returns an empty list when the lookup fails for any reason.
    fn resolve_a(&self, name: &str) -> Vec<Ipv4Addr>;
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn resolve_srv(&self, query: &str) -> Vec<SrvRecord> {
        (**self).resolve_srv(query)
    }

    fn resolve_a(&self, name: &str) -> Vec<Ipv4Addr> {
        (**self).resolve_a(name)
    }
}

#[derive(Debug, Default)]
struct Records {
    srv: HashMap<String, Vec<SrvRecord>>,
    a: HashMap<String, Vec<Ipv4Addr>>,
}

/// In-memory resolver with editable answers.
///
/// Clones share the same tables, so a caller can keep one clone and
/// change the answers seen by a pool that owns another. Unknown names
/// resolve to nothing, which is how a lookup timeout looks to a pool.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    records: Arc<Mutex<Records>>,
}

impl StaticResolver {
    /// Creates a resolver without any records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builder form of [`StaticResolver::set_srv`].
    #[must_use]
    pub fn with_srv(self, query: impl Into<String>, records: Vec<SrvRecord>) -> Self {
        self.set_srv(query, records);
        self
    }

    /// Builder form of [`StaticResolver::set_a`].
    #[must_use]
    pub fn with_a(self, name: impl Into<String>, addrs: Vec<Ipv4Addr>) -> Self {
        self.set_a(name, addrs);
        self
    }

    /// Replaces the SRV answer for `query`.
    pub fn set_srv(&self, query: impl Into<String>, records: Vec<SrvRecord>) {
        self.records().srv.insert(query.into(), records);
    }

    /// Replaces the A answer for `name`.
    pub fn set_a(&self, name: impl Into<String>, addrs: Vec<Ipv4Addr>) {
        self.records().a.insert(name.into(), addrs);
    }

    /// Forgets every record.
    pub fn clear(&self) {
        let mut records = self.records();
        records.srv.clear();
        records.a.clear();
    }
}

impl Resolver for StaticResolver {
    fn resolve_srv(&self, query: &str) -> Vec<SrvRecord> {
        let found = self.records().srv.get(query).cloned();
        found.unwrap_or_else(|| {
            tracing::debug!(query, "no SRV records");
            Vec::new()
        })
    }

    fn resolve_a(&self, name: &str) -> Vec<Ipv4Addr> {
        let found = self.records().a.get(name).cloned();
        found.unwrap_or_else(|| {
            tracing::debug!(name, "no A records");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_service_is_a_port() {
        assert_eq!("9000".parse::<Service>(), Ok(Service::Port(9000)));
        assert_eq!(" 80 ".parse::<Service>(), Ok(Service::Port(80)));
        assert!("70000".parse::<Service>().is_err());
        assert!("".parse::<Service>().is_err());
    }

    #[test]
    fn symbolic_service_builds_srv_query() {
        let Ok(service) = "zkit".parse::<Service>() else {
            panic!("expected a named service");
        };
        assert_eq!(service, Service::Named("zkit".to_string()));
        assert_eq!(
            service.srv_query("example.com").as_deref(),
            Some("_zkit._tcp.example.com")
        );
        assert_eq!(Service::Port(1).srv_query("example.com"), None);
        assert_eq!(Service::Port(1).port(), Some(1));
        assert_eq!(service.port(), None);
    }

    #[test]
    fn service_display_round_trips() {
        assert_eq!(Service::Port(9000).to_string(), "9000");
        assert_eq!(Service::Named("web".into()).to_string(), "web");
    }

    #[test]
    fn static_resolver_answers_and_misses() {
        let addr = Ipv4Addr::new(10, 0, 0, 1);
        let resolver = StaticResolver::new()
            .with_srv("_s._tcp.n", vec![SrvRecord::new(9000, "host.n")])
            .with_a("host.n", vec![addr]);
        assert_eq!(
            resolver.resolve_srv("_s._tcp.n"),
            vec![SrvRecord::new(9000, "host.n")]
        );
        assert_eq!(resolver.resolve_a("host.n"), vec![addr]);
        assert!(resolver.resolve_a("other.n").is_empty());
        assert!(resolver.resolve_srv("_x._tcp.n").is_empty());
    }

    #[test]
    fn static_resolver_clones_share_records() {
        let resolver = StaticResolver::new();
        let handle = resolver.clone();
        handle.set_a("host", vec![Ipv4Addr::LOCALHOST]);
        assert_eq!(resolver.resolve_a("host"), vec![Ipv4Addr::LOCALHOST]);
        handle.clear();
        assert!(resolver.resolve_a("host").is_empty());
    }

    #[test]
    fn arc_resolver_delegates() {
        let resolver = Arc::new(StaticResolver::new().with_a("h", vec![Ipv4Addr::LOCALHOST]));
        assert_eq!(Resolver::resolve_a(&resolver, "h"), vec![Ipv4Addr::LOCALHOST]);
    }
}
