// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery Server client configuration.

use std::time::Duration;

use crate::core::guid::GuidPrefix;
use crate::core::locator::Locator;

/// Default period of the client sync timer.
pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_millis(450);

/// A discovery server the client connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteServer {
    /// Well-known GUID prefix of the server.
    pub prefix: GuidPrefix,
    /// Metatraffic unicast locators of the server.
    pub locators: Vec<Locator>,
}

impl RemoteServer {
    pub fn new(prefix: GuidPrefix, locator: Locator) -> Self {
        Self {
            prefix,
            locators: vec![locator],
        }
    }
}

/// Configuration for connecting to one or more Discovery Servers.
#[derive(Debug, Clone)]
pub struct DiscoveryServerConfig {
    /// Servers to connect to.
    pub servers: Vec<RemoteServer>,

    /// Period of the sync timer (pings and builtin matching).
    pub sync_period: Duration,
}

impl Default for DiscoveryServerConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            sync_period: DEFAULT_SYNC_PERIOD,
        }
    }
}

impl DiscoveryServerConfig {
    /// Create a configuration with a single server.
    pub fn new(server: RemoteServer) -> Self {
        Self {
            servers: vec![server],
            ..Default::default()
        }
    }

    /// Builder: add a server.
    pub fn with_server(mut self, server: RemoteServer) -> Self {
        self.servers.push(server);
        self
    }

    /// Builder: set the sync period.
    pub fn with_sync_period(mut self, period: Duration) -> Self {
        self.sync_period = period;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.servers.is_empty() {
            return Err("at least one discovery server is required");
        }
        if self.servers.iter().any(|s| s.prefix.is_unknown()) {
            return Err("server prefix must be known");
        }
        if self.servers.iter().any(|s| s.locators.is_empty()) {
            return Err("server needs at least one locator");
        }
        if self.sync_period.is_zero() {
            return Err("sync_period must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn server(n: u8) -> RemoteServer {
        RemoteServer::new(
            GuidPrefix([n; 12]),
            Locator::udpv4(Ipv4Addr::new(127, 0, 0, n), 7410),
        )
    }

    #[test]
    fn test_default_config_needs_servers() {
        let config = DiscoveryServerConfig::default();
        assert_eq!(config.sync_period, DEFAULT_SYNC_PERIOD);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = DiscoveryServerConfig::new(server(1))
            .with_server(server(2))
            .with_sync_period(Duration::from_millis(100));
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.sync_period, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = DiscoveryServerConfig::new(server(1)).with_sync_period(Duration::ZERO);
        assert!(config.validate().is_err());

        config.sync_period = DEFAULT_SYNC_PERIOD;
        config.servers[0].locators.clear();
        assert!(config.validate().is_err());

        config.servers[0] = RemoteServer::new(
            GuidPrefix::UNKNOWN,
            Locator::udpv4(Ipv4Addr::LOCALHOST, 7410),
        );
        assert!(config.validate().is_err());
    }
}
