//! Discovery configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`):
//!
//! | Variable                      | Default | Meaning                              |
//! |-------------------------------|---------|--------------------------------------|
//! | `ZKIT_DISCOVERY_NAME`         | unset   | DNS name to resolve; unset skips DNS |
//! | `ZKIT_DISCOVERY_SERVICE`      | `zkit`  | SRV service name, or a fixed port    |
//! | `ZKIT_DISCOVERY_INTERVAL_MS`  | `5000`  | milliseconds between rounds          |
//! | `ZKIT_DISCOVERY_SOCKET_KIND`  | `sub`   | `req`, `pull` or `sub`               |
//! | `ZKIT_DISCOVERY_ENDPOINTS`    | empty   | comma separated pinned endpoints     |

use crate::discovery::Service;
use crate::error::ConfigError;
use crate::transport::SocketKind;

/// Default milliseconds between discovery rounds.
pub const DEFAULT_INTERVAL_MS: u64 = 5000;

/// Default SRV service name.
pub const DEFAULT_SERVICE: &str = "zkit";

const NAME: &str = "ZKIT_DISCOVERY_NAME";
const SERVICE: &str = "ZKIT_DISCOVERY_SERVICE";
const INTERVAL_MS: &str = "ZKIT_DISCOVERY_INTERVAL_MS";
const SOCKET_KIND: &str = "ZKIT_DISCOVERY_SOCKET_KIND";
const ENDPOINTS: &str = "ZKIT_DISCOVERY_ENDPOINTS";

/// Settings for a [`crate::discovery::DiscoveredStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// DNS name to resolve. `None` means only pinned endpoints are used.
    pub name: Option<String>,

    /// SRV service name or fixed port.
    pub service: Service,

    /// Milliseconds between discovery rounds; 0 resolves on every
    /// iteration.
    pub interval_ms: u64,

    /// Kind of the sockets opened for discovered endpoints.
    pub socket_kind: SocketKind,

    /// Endpoints connected regardless of DNS.
    pub endpoints: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            name: None,
            service: Service::Named(DEFAULT_SERVICE.to_string()),
            interval_ms: DEFAULT_INTERVAL_MS,
            socket_kind: SocketKind::Sub,
            endpoints: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file,
    /// then reads the variables listed in the module docs.
    ///
    /// # Errors
    ///
    /// See [`DiscoveryConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    ///
    /// Unset or blank variables take their defaults. An unparsable
    /// interval also falls back to the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the service is not a
    /// valid name or port, or the socket kind is unknown.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let service = match var(SERVICE) {
            Some(value) => value.parse().map_err(|reason| ConfigError::InvalidValue {
                key: SERVICE,
                value,
                reason,
            })?,
            None => defaults.service,
        };

        let socket_kind = match var(SOCKET_KIND) {
            Some(value) => value.parse().map_err(|reason| ConfigError::InvalidValue {
                key: SOCKET_KIND,
                value,
                reason,
            })?,
            None => defaults.socket_kind,
        };

        let interval_ms = parse_or(var(INTERVAL_MS), DEFAULT_INTERVAL_MS);

        let endpoints = var(ENDPOINTS)
            .map(|list| split_list(&list))
            .unwrap_or_default();

        Ok(Self {
            name: var(NAME),
            service,
            interval_ms,
            socket_kind,
            endpoints,
        })
    }
}

/// Parses `value` as `T`, returning `default` on missing or invalid
/// values.
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<DiscoveryConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        DiscoveryConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let Ok(config) = load(&[]) else {
            panic!("defaults should load");
        };
        assert_eq!(config, DiscoveryConfig::default());
        assert_eq!(config.interval_ms, 5000);
        assert_eq!(config.socket_kind, SocketKind::Sub);
        assert_eq!(config.service, Service::Named("zkit".to_string()));
    }

    #[test]
    fn reads_every_variable() {
        let Ok(config) = load(&[
            ("ZKIT_DISCOVERY_NAME", "workers.example.com"),
            ("ZKIT_DISCOVERY_SERVICE", "9000"),
            ("ZKIT_DISCOVERY_INTERVAL_MS", "250"),
            ("ZKIT_DISCOVERY_SOCKET_KIND", "PULL"),
            ("ZKIT_DISCOVERY_ENDPOINTS", "tcp://10.0.0.1:9000, tcp://10.0.0.2:9000,"),
        ]) else {
            panic!("config should load");
        };
        assert_eq!(config.name.as_deref(), Some("workers.example.com"));
        assert_eq!(config.service, Service::Port(9000));
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.socket_kind, SocketKind::Pull);
        assert_eq!(
            config.endpoints,
            vec!["tcp://10.0.0.1:9000", "tcp://10.0.0.2:9000"]
        );
    }

    #[test]
    fn blank_name_means_no_dns() {
        let Ok(config) = load(&[("ZKIT_DISCOVERY_NAME", "  ")]) else {
            panic!("config should load");
        };
        assert_eq!(config.name, None);
    }

    #[test]
    fn invalid_interval_falls_back() {
        let Ok(config) = load(&[("ZKIT_DISCOVERY_INTERVAL_MS", "soon")]) else {
            panic!("config should load");
        };
        assert_eq!(config.interval_ms, DEFAULT_INTERVAL_MS);
    }

    #[test]
    fn unknown_socket_kind_is_rejected() {
        let Err(ConfigError::InvalidValue { key, value, .. }) =
            load(&[("ZKIT_DISCOVERY_SOCKET_KIND", "bogus")])
        else {
            panic!("expected an invalid value");
        };
        assert_eq!(key, "ZKIT_DISCOVERY_SOCKET_KIND");
        assert_eq!(value, "bogus");
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        assert!(matches!(
            load(&[("ZKIT_DISCOVERY_SERVICE", "123456")]),
            Err(ConfigError::InvalidValue { key: "ZKIT_DISCOVERY_SERVICE", .. })
        ));
    }
}
