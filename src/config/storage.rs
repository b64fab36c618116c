// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Persistent storage configuration

use serde::{Deserialize, Serialize};

/// Location and locking policy of the persisted signing key material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Directory holding the key material file and its lock.
    /// When absent the key material only lives for the process lifetime.
    #[serde(default = "default_data_dir")]
    pub data_dir: Option<String>,

    /// How long to wait for the config lock before giving up
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

fn default_data_dir() -> Option<String> {
    Some("data".to_string())
}

fn default_lock_timeout() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}
