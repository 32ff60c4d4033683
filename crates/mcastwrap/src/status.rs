// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON status records broadcast next to invocation traffic.
//!
//! A status record tells the group which machine sent it and carries a
//! free-form JSON value. It is independent of the invocation codec: both
//! travel as plain datagrams over the same transport.

use crate::error::{Error, Result};
use crate::transport::MulticastTransport;
use serde::{Deserialize, Serialize};

/// Human-readable status message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusMessage {
    /// Sender's machine type (e.g. "server", "client").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    /// Sender's role in the group (e.g. "master", "slave").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_category: Option<String>,
    /// Sender's IPv4 address on the group interface.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_ip: Option<String>,
    /// Application payload, itself a JSON document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_value: Option<String>,
}

impl StatusMessage {
    pub fn new(machine_category: impl Into<String>, json_value: impl Into<String>) -> Self {
        Self {
            machine_category: Some(machine_category.into()),
            json_value: Some(json_value.into()),
            ..Default::default()
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse a received datagram. Surrounding whitespace and NUL padding are
    /// ignored, as are unknown fields.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::deserialization(format!("status message is not UTF-8: {}", e)))?;
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        serde_json::from_str(text)
            .map_err(|e| Error::deserialization(format!("invalid status message: {}", e)))
    }
}

impl MulticastTransport {
    /// Stamp `message` with this node's machine type and IPv4, then send it.
    pub fn send_status(&self, message: &mut StatusMessage, machine_type: &str) -> Result<()> {
        message.machine_type = Some(machine_type.to_string());
        message.machine_ip = Some(self.local_ipv4().to_string());
        let bytes = message.to_bytes()?;
        log::debug!(
            "[MCAST] status type={} category={:?} len={}",
            machine_type,
            message.machine_category,
            bytes.len()
        );
        self.send(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_fields() {
        let msg = StatusMessage {
            machine_type: Some("server".into()),
            machine_category: Some("master".into()),
            machine_ip: Some("10.0.0.4".into()),
            json_value: Some("{\"load\":0.5}".into()),
        };
        let text = String::from_utf8(msg.to_bytes().unwrap()).unwrap();
        assert!(text.contains("\"machineType\":\"server\""));
        assert!(text.contains("\"machineCategory\":\"master\""));
        assert!(text.contains("\"machineIp\":\"10.0.0.4\""));
        assert!(text.contains("\"jsonValue\""));
        assert_eq!(StatusMessage::from_bytes(text.as_bytes()).unwrap(), msg);
    }

    #[test]
    fn test_lenient_padding_and_unknown_fields() {
        let mut raw = b"  {\"machineCategory\":\"slave\",\"executeClass\":\"X\"}\n".to_vec();
        raw.extend_from_slice(&[0u8; 16]);
        let msg = StatusMessage::from_bytes(&raw).unwrap();
        assert_eq!(msg.machine_category.as_deref(), Some("slave"));
        assert_eq!(msg.machine_type, None);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            StatusMessage::from_bytes(b"MCIV\x01"),
            Err(Error::Deserialization(_))
        ));
        assert!(matches!(
            StatusMessage::from_bytes(&[0xFF, 0xFE]),
            Err(Error::Deserialization(_))
        ));
    }

    #[test]
    fn test_new_leaves_sender_fields_empty() {
        let msg = StatusMessage::new("master", "{}");
        assert_eq!(msg.machine_category.as_deref(), Some("master"));
        assert!(msg.machine_type.is_none());
        assert!(msg.machine_ip.is_none());
    }
}
