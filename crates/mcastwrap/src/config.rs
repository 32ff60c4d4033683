// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport constants and file/environment configuration.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: protocol limits (datagram sizes, port range, TTL)
//! - **Level 2 (Dynamic)**: [`TransportConfig`] loaded from TOML and/or the
//!   environment, then turned into a [`TransportBuilder`]
//!
//! # Environment Variables
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `MCASTWRAP_MULTICAST_IF` | interface name |
//! | `MCASTWRAP_GROUP` | multicast group address |
//! | `MCASTWRAP_PORT` | group port |
//! | `MCASTWRAP_TTL` | multicast TTL (0-255) |
//! | `MCASTWRAP_LOOPBACK` | `1`/`0`, deliver own datagrams locally |

use crate::error::{Error, Result};
use crate::transport::{list_network_interfaces, NetworkInterface, TransportBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest UDP payload carried by one IPv4 datagram (65535 - 20 IP - 8 UDP).
pub const MAX_PAYLOAD_SIZE: usize = 65_507;

/// Receive buffer size; the largest datagram the OS can hand back.
pub const RECV_BUFFER_SIZE: usize = 65_535;

/// Highest valid UDP port.
pub const MAX_PORT: u32 = 65_535;

/// Default multicast TTL (link-local only, datagrams never cross a router).
pub const DEFAULT_MULTICAST_TTL: u32 = 1;

/// Highest valid IPv4 TTL.
pub const MAX_TTL: u32 = 255;

/// Thread name of the receive loop.
pub const CONSUMER_THREAD_NAME: &str = "mcastwrap-rx";

/// Group membership settings for one transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Interface name (e.g. `eth0`). First candidate interface when unset.
    #[serde(default)]
    pub interface: Option<String>,

    /// Multicast group address (e.g. `224.1.1.1`).
    #[serde(default)]
    pub group: Option<String>,

    /// Group port. Kept wide so out-of-range values reach validation.
    #[serde(default)]
    pub port: Option<u32>,

    /// Deliver datagrams sent by this socket to the local callback.
    #[serde(default = "default_true")]
    pub loopback: bool,

    /// Drop datagrams whose source is this node's interface address.
    #[serde(default)]
    pub ignore_own_messages: bool,

    /// Multicast TTL.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u32 {
    DEFAULT_MULTICAST_TTL
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            interface: None,
            group: None,
            port: None,
            loopback: true,
            ignore_own_messages: false,
            ttl: DEFAULT_MULTICAST_TTL,
        }
    }
}

impl TransportConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serialize configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Override fields from `MCASTWRAP_*` environment variables.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(name) = lookup("MCASTWRAP_MULTICAST_IF") {
            log::debug!("[CONFIG] Using MCASTWRAP_MULTICAST_IF override: {}", name);
            self.interface = Some(name);
        }
        if let Some(group) = lookup("MCASTWRAP_GROUP") {
            self.group = Some(group);
        }
        if let Some(raw) = lookup("MCASTWRAP_PORT") {
            match raw.trim().parse::<u32>() {
                Ok(port) => self.port = Some(port),
                Err(_) => log::warn!("[CONFIG] Ignoring invalid MCASTWRAP_PORT='{}'", raw),
            }
        }
        if let Some(raw) = lookup("MCASTWRAP_TTL") {
            match raw.trim().parse::<u32>() {
                Ok(ttl) => self.ttl = ttl,
                Err(_) => log::warn!("[CONFIG] Ignoring invalid MCASTWRAP_TTL='{}'", raw),
            }
        }
        if let Some(raw) = lookup("MCASTWRAP_LOOPBACK") {
            match raw.trim() {
                "1" | "true" => self.loopback = true,
                "0" | "false" => self.loopback = false,
                other => log::warn!("[CONFIG] Ignoring invalid MCASTWRAP_LOOPBACK='{}'", other),
            }
        }
        self
    }

    /// Resolve the interface and pre-fill a transport builder.
    ///
    /// Validation of group/port still happens in [`TransportBuilder::build`].
    pub fn builder(&self) -> Result<TransportBuilder> {
        let interface = match &self.interface {
            Some(name) => Some(NetworkInterface::by_name(name)?.ok_or_else(|| {
                Error::Config(format!("network interface '{}' not found", name))
            })?),
            None => list_network_interfaces()?.into_iter().next(),
        };

        let mut builder = TransportBuilder::default()
            .loopback(self.loopback)
            .ignore_own_messages(self.ignore_own_messages)
            .ttl(self.ttl);
        if let Some(interface) = interface {
            builder = builder.interface(interface);
        }
        if let Some(group) = &self.group {
            builder = builder.group_address(group.as_str());
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert!(config.loopback);
        assert!(!config.ignore_own_messages);
        assert_eq!(config.ttl, DEFAULT_MULTICAST_TTL);
        assert!(config.group.is_none());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = TransportConfig::from_toml(
            r#"
            group = "224.0.0.1"
            port = 14725
            ignore_own_messages = true
            "#,
        )
        .expect("valid TOML");
        assert_eq!(config.group.as_deref(), Some("224.0.0.1"));
        assert_eq!(config.port, Some(14725));
        assert!(config.loopback);
        assert!(config.ignore_own_messages);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = TransportConfig::from_toml("port = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = TransportConfig {
            interface: Some("eth0".into()),
            group: Some("239.1.2.3".into()),
            port: Some(4000),
            loopback: false,
            ignore_own_messages: true,
            ttl: 16,
        };
        let text = config.to_toml().expect("serializable");
        assert_eq!(TransportConfig::from_toml(&text).expect("parsable"), config);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MCASTWRAP_MULTICAST_IF", "eth1"),
            ("MCASTWRAP_GROUP", "239.9.9.9"),
            ("MCASTWRAP_PORT", "7000"),
            ("MCASTWRAP_TTL", "not-a-number"),
            ("MCASTWRAP_LOOPBACK", "0"),
        ]
        .into_iter()
        .collect();

        let config = TransportConfig::default()
            .apply_vars(|key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.interface.as_deref(), Some("eth1"));
        assert_eq!(config.group.as_deref(), Some("239.9.9.9"));
        assert_eq!(config.port, Some(7000));
        assert_eq!(config.ttl, DEFAULT_MULTICAST_TTL);
        assert!(!config.loopback);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(&mut file, b"group = \"224.1.1.1\"\nport = 1234\n")
            .expect("write config");
        let config = TransportConfig::from_file(file.path()).expect("load config");
        assert_eq!(config.port, Some(1234));
    }

    #[test]
    fn test_from_missing_file() {
        let err = TransportConfig::from_file("/nonexistent/mcastwrap.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
