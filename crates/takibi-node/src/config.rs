//! Node configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the node can start with zero
//! configuration on a trusted network segment.

use std::net::Ipv4Addr;

use takibi_shared::constants::{
    BEACON_GROUP, BEACON_PORT, DEFAULT_SERVICE_TAG, DEFAULT_SESSION_PORT,
};

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Display name advertised to peers.
    /// Env: `TAKIBI_NAME`
    /// Default: `"User"`
    pub display_name: String,

    /// Rendezvous service tag to advertise and browse on.
    /// Env: `TAKIBI_SERVICE`
    /// Default: `"takibi-chat"`
    pub service_tag: String,

    /// TCP session listen port (0 picks an ephemeral port).
    /// Env: `TAKIBI_PORT`
    /// Default: `7464`
    pub session_port: u16,

    /// Multicast group for presence beacons.
    /// Env: `TAKIBI_BEACON_GROUP`
    pub beacon_group: Ipv4Addr,

    /// Multicast port for presence beacons.
    /// Env: `TAKIBI_BEACON_PORT`
    pub beacon_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            display_name: "User".to_string(),
            service_tag: DEFAULT_SERVICE_TAG.to_string(),
            session_port: DEFAULT_SESSION_PORT,
            beacon_group: BEACON_GROUP.parse().expect("valid multicast group"),
            beacon_port: BEACON_PORT,
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("TAKIBI_NAME") {
            if !name.trim().is_empty() {
                config.display_name = name;
            }
        }

        if let Ok(service) = std::env::var("TAKIBI_SERVICE") {
            if !service.trim().is_empty() {
                config.service_tag = service;
            }
        }

        if let Ok(port) = std::env::var("TAKIBI_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) => config.session_port = parsed,
                Err(_) => {
                    tracing::warn!(value = %port, "Invalid TAKIBI_PORT, using default");
                }
            }
        }

        if let Ok(group) = std::env::var("TAKIBI_BEACON_GROUP") {
            match group.parse::<Ipv4Addr>() {
                Ok(parsed) if parsed.is_multicast() => config.beacon_group = parsed,
                _ => {
                    tracing::warn!(value = %group, "Invalid TAKIBI_BEACON_GROUP, using default");
                }
            }
        }

        if let Ok(port) = std::env::var("TAKIBI_BEACON_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) => config.beacon_port = parsed,
                Err(_) => {
                    tracing::warn!(value = %port, "Invalid TAKIBI_BEACON_PORT, using default");
                }
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.display_name, "User");
        assert_eq!(config.service_tag, "takibi-chat");
        assert_eq!(config.session_port, 7464);
        assert!(config.beacon_group.is_multicast());
    }
}
