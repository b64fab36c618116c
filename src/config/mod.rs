// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the OpenID provider
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema before it is deserialized.
//!
//! ## Configuration Structure
//!
//! - `server`: network binding of the Rocket server and handler deadlines
//! - `oidc`: issuer, login UI, default client and development switches
//! - `access`: static user directory used by the default credential provider
//! - `storage`: location of the persisted signing key material
//!
//! ## Usage
//!
//! ```no_run
//! use rust_oidc_provider::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(8081),                                  // Port
//!     Some("0.0.0.0".to_string()),                 // Address
//!     Some("https://auth.example.com/".to_string()), // Issuer
//!     None,                                        // Web URL
//!     None,                                        // Crypto key
//!     false,                                       // Force dev mode
//!     false,                                       // Deny HTTP
//!     None,                                        // Data directory
//! );
//!
//! println!("Issuer: {}", config.oidc.issuer());
//! ```

pub mod access;
pub mod oidc;
pub mod server;
pub mod storage;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use access::{AccessConfig, User};
pub use oidc::{ClientConfig, DistinguishedNameConfig, OidcConfig};
pub use server::ServerConfig;
pub use storage::StorageConfig;
pub use utils::{is_valid_ip_address, output_config_schema};

/// Root configuration structure of the OpenID provider
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, allowing for minimal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings for the HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Settings of the authorization server itself
    #[serde(default)]
    pub oidc: OidcConfig,

    /// Users allowed to sign in through the login UI
    #[serde(default)]
    pub access: AccessConfig,

    /// Where the signing key material is persisted
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. An existing
    /// file is validated against the embedded JSON schema, deserialized and
    /// then checked with [`utils::validate_specific_rules`]. On any validation
    /// failure a `*.sample.yaml` file is written next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let config = match Self::from_yaml_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration error in {}: {:#}", path.display(), err);
                Self::create_sample_config(path)?;
                return Err(err);
            }
        };

        Ok(config)
    }

    /// Parse and validate a configuration from its YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating configuration against schema");
        if let Err(error) = validator.validate(&json_value) {
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config =
            serde_yml::from_str(contents).context("Failed to deserialize configuration")?;

        utils::validate_specific_rules(&config)?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only explicitly provided values override the loaded configuration.
    /// The rule checks are not re-run here; callers validate afterwards with
    /// [`utils::validate_specific_rules`].
    ///
    /// # Parameters
    ///
    /// * `port` - TCP port of the HTTP server
    /// * `address` - Network address to bind to
    /// * `issuer` - Canonical issuer URL
    /// * `web_url` - Base URL of the login UI
    /// * `key` - Secret used to derive the internal crypto key
    /// * `dev` - If true, forces development mode
    /// * `deny_http` - If true, refuses the automatic development mode
    /// * `data_dir` - Directory holding the signing key material
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        port: Option<u16>,
        address: Option<String>,
        issuer: Option<String>,
        web_url: Option<String>,
        key: Option<String>,
        dev: bool,
        deny_http: bool,
        data_dir: Option<String>,
    ) {
        if let Some(port) = port {
            debug!("Overriding port from command line: {}", port);
            self.server.port = port;
        }

        if let Some(address) = address {
            debug!("Overriding address from command line: {}", address);
            self.server.address = address;
        }

        if let Some(issuer) = issuer {
            debug!("Overriding issuer from command line: {}", issuer);
            self.oidc.issuer = issuer;
        }

        if let Some(web_url) = web_url {
            debug!("Overriding web URL from command line: {}", web_url);
            self.oidc.web_url = web_url;
        }

        if let Some(key) = key {
            debug!("Overriding crypto key from command line");
            self.oidc.key = key;
        }

        if dev {
            self.oidc.dev = true;
        }

        if deny_http {
            self.oidc.deny_http = true;
        }

        if let Some(data_dir) = data_dir {
            debug!("Overriding data directory from command line: {}", data_dir);
            self.storage.data_dir = Some(data_dir);
        }
    }
}
