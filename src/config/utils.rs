// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use std::collections::HashSet;

use anyhow::{Context, Result};
use base64::Engine;
use log::{debug, warn};
use url::Url;

use super::Config;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./oidc_server --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

fn parse_http_url(name: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).with_context(|| format!("{} is not a valid URL: {}", name, value))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("{} must use http or https: {}", name, value);
    }
    Ok(url)
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Issuer**: must be an absolute http(s) URL; an `http://` issuer combined
///   with `deny_http` is rejected
/// - **Web URL**: must be an absolute http(s) URL
/// - **Crypto key**: must not be empty
/// - **TLS material**: certificate and key must be provided together and be valid base64
/// - **Port Range**: ensures the port is within 1-65534
/// - **User Credentials**: password hashes must be base64-encoded crypt hashes,
///   subjects must be non-empty, and emails unique
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let issuer = parse_http_url("Issuer", &config.oidc.issuer)?;
    if issuer.scheme() == "http" && config.oidc.deny_http {
        anyhow::bail!(
            "Issuer {} uses http:// but deny_http is set",
            config.oidc.issuer
        );
    }
    if issuer.query().is_some() || issuer.fragment().is_some() {
        anyhow::bail!("Issuer must not carry a query or fragment");
    }

    parse_http_url("Web URL", &config.oidc.web_url)?;
    if let Some(url) = &config.oidc.url {
        parse_http_url("Public URL", url)?;
    }

    if config.oidc.key.is_empty() {
        anyhow::bail!("OIDC crypto key must not be empty");
    }

    if config.oidc.default_client_id.is_empty() {
        anyhow::bail!("Default client id must not be empty");
    }

    if let Some(cert) = &config.server.cert {
        if config.server.key.is_none() {
            anyhow::bail!("SSL certificate provided without a key");
        }
        let _ = base64::engine::general_purpose::STANDARD
            .decode(cert)
            .context("SSL certificate is not valid base64")?;
    }

    if let Some(key) = &config.server.key {
        if config.server.cert.is_none() {
            anyhow::bail!("SSL key provided without a certificate");
        }
        let _ = base64::engine::general_purpose::STANDARD
            .decode(key)
            .context("SSL key is not valid base64")?;
    }

    if config.server.port < 1 || config.server.port > 65534 {
        anyhow::bail!("Invalid port number: {}", config.server.port);
    }

    if !is_valid_ip_address(&config.server.address) {
        // Hostnames are accepted by Rocket, only warn
        warn!(
            "Potentially invalid address format: {}",
            config.server.address
        );
    }

    let mut emails = HashSet::new();
    for user in &config.access.users {
        if user.subject.is_empty() {
            anyhow::bail!("User {} has an empty subject", user.email);
        }
        if !emails.insert(user.email.as_str()) {
            anyhow::bail!("Duplicate user email: {}", user.email);
        }
        let decoded_pass = base64::engine::general_purpose::STANDARD
            .decode(&user.pass)
            .context("User password is not valid base64")?;
        if !decoded_pass.starts_with(b"$1$")
            && !decoded_pass.starts_with(b"$5$")
            && !decoded_pass.starts_with(b"$6$")
            && !decoded_pass.starts_with(b"$apr1$")
        {
            anyhow::bail!("User password is not a valid hash, you should use openssl passwd -5 <password> | base64 -w0");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_http_issuer_with_deny_http_is_rejected() {
        let mut config = Config::default();
        config.oidc.issuer = "http://example.com".to_string();
        config.oidc.deny_http = true;
        let err = validate_specific_rules(&config).unwrap_err();
        assert!(err.to_string().contains("deny_http"));
    }

    #[test]
    fn test_invalid_password_hash_is_rejected() {
        let mut config = Config::default();
        config.access.users[0].pass = base64::engine::general_purpose::STANDARD.encode("plain");
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_duplicate_email_is_rejected() {
        let mut config = Config::default();
        let user = config.access.users[0].clone();
        config.access.users.push(user);
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_ip_address_check() {
        assert!(is_valid_ip_address("127.0.0.1"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("not an address"));
    }
}
