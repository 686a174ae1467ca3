//! Environment configuration for the sync bridge

use std::net::SocketAddr;

use thiserror::Error;

/// Default bind host for the local bridge socket
pub const DEFAULT_BRIDGE_HOST: &str = "127.0.0.1";

/// Default bind port for the local bridge socket
pub const DEFAULT_BRIDGE_PORT: u16 = 3210;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Settings for the bridge process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Relay endpoint used when `configure` does not name one
    pub relay_url: Option<String>,
    /// Master key sent on join when `configure` does not carry one
    pub master_key: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BRIDGE_HOST.to_string(),
            port: DEFAULT_BRIDGE_PORT,
            relay_url: None,
            master_key: None,
        }
    }
}

impl BridgeConfig {
    /// Load from `SYNC_BRIDGE_HOST`, `SYNC_BRIDGE_PORT`, `SYNC_RELAY_URL`
    /// and `SYNC_MASTER_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = non_empty(lookup("SYNC_BRIDGE_HOST")) {
            config.host = host;
        }

        if let Some(port) = non_empty(lookup("SYNC_BRIDGE_PORT")) {
            config.port = port.parse().map_err(|_| ConfigError::Invalid {
                name: "SYNC_BRIDGE_PORT",
                value: port,
            })?;
        }

        config.relay_url = non_empty(lookup("SYNC_RELAY_URL"));
        config.master_key = non_empty(lookup("SYNC_MASTER_KEY"));

        Ok(config)
    }

    /// Socket address to bind the local listener to
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            name: "SYNC_BRIDGE_HOST",
            value: raw,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:3210");
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("SYNC_BRIDGE_HOST", "0.0.0.0"),
            ("SYNC_BRIDGE_PORT", "4000"),
            ("SYNC_RELAY_URL", "ws://relay.example:8787/sync"),
            ("SYNC_MASTER_KEY", "  "),
        ]))
        .unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.relay_url.as_deref(), Some("ws://relay.example:8787/sync"));
        assert_eq!(config.master_key, None);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:4000");
    }

    #[test]
    fn test_bad_port() {
        let err = BridgeConfig::from_lookup(lookup(&[("SYNC_BRIDGE_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("SYNC_BRIDGE_PORT"));
    }
}
