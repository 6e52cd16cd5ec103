// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration document shape.
//!
//! Loading the document from disk and validating it are out of scope for
//! this crate (thin wrappers owned by the agent binary); this module only
//! defines the shape so every crate can share one source of truth.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Maximum size, in bytes, a config document may be before it is
/// rejected outright.
pub const MAX_CONFIG_SIZE: u64 = 10 << 20;

/// Default network timeout, in seconds, when `timeout` is omitted.
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub network: NetworkConfig,
    pub files: Vec<FileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub servers: Vec<String>,
    #[serde(rename = "ssl certificate", default)]
    pub ssl_certificate: Option<String>,
    #[serde(rename = "ssl key", default)]
    pub ssl_key: Option<String>,
    #[serde(rename = "ssl ca", default)]
    pub ssl_ca: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_NETWORK_TIMEOUT_SECS
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub paths: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_ssl_keys_with_spaces() {
        let json = r#"{
            "servers": ["a:1"],
            "ssl certificate": "/cert.pem",
            "ssl key": "/key.pem",
            "ssl ca": "/ca.pem"
        }"#;
        let net: NetworkConfig = serde_json::from_str(json).unwrap();
        assert_eq!(net.ssl_certificate.as_deref(), Some("/cert.pem"));
        assert_eq!(net.timeout, DEFAULT_NETWORK_TIMEOUT_SECS);
    }

    #[test]
    fn timeout_defaults_when_absent() {
        let json = r#"{"servers": ["a:1"]}"#;
        let net: NetworkConfig = serde_json::from_str(json).unwrap();
        assert_eq!(net.timeout(), Duration::from_secs(15));
    }
}
