// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP server configuration

use serde::{Deserialize, Serialize};

/// Network binding and request handling settings of the Rocket server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// The network address to bind to
    #[serde(default = "default_address")]
    pub address: String,

    /// The TCP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline applied to the login and token handlers
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Optional TLS certificate (base64-encoded PEM)
    #[serde(default)]
    pub cert: Option<String>,

    /// Optional TLS private key (base64-encoded PEM)
    #[serde(default)]
    pub key: Option<String>,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            cert: None,
            key: None,
        }
    }
}
