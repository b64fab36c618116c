// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OpenID provider configuration
//!
//! This module defines the settings of the embedded authorization server:
//! issuer and public URLs, the login UI location, the default client, the
//! certificate subject used when key material is generated, and the
//! development-mode switches.

use rsa::sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use url::Url;

/// Distinguished name used for the self-signed signing certificate
///
/// Only consulted on first boot, when no key material exists yet in the
/// configuration store. The defaults are deliberately dummy values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistinguishedNameConfig {
    #[serde(default = "default_common_name")]
    pub common_name: String,

    #[serde(default = "default_organization")]
    pub organization: String,

    #[serde(default)]
    pub organizational_unit: Option<String>,

    #[serde(default = "default_country")]
    pub country: String,

    #[serde(default)]
    pub province: Option<String>,

    #[serde(default)]
    pub locality: Option<String>,
}

fn default_common_name() -> String {
    "oidc.example.invalid".to_string()
}

fn default_organization() -> String {
    "Example Org".to_string()
}

fn default_country() -> String {
    "JP".to_string()
}

impl Default for DistinguishedNameConfig {
    fn default() -> Self {
        Self {
            common_name: default_common_name(),
            organization: default_organization(),
            organizational_unit: None,
            country: default_country(),
            province: None,
            locality: None,
        }
    }
}

/// Additional statically registered client
///
/// The default client is always derived from [`OidcConfig`]; entries of this
/// type register further first-party web clients sharing the same policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub client_id: String,

    pub redirect_uris: Vec<String>,

    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,

    /// Login page URL with a single `{id}` placeholder for the request id
    #[serde(default)]
    pub login_uri_template: Option<String>,
}

/// Settings of the embedded OpenID provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Canonical issuer URL; a trailing slash is enforced by [`OidcConfig::issuer`]
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Public URL the engine is reachable at (defaults to the issuer)
    #[serde(default)]
    pub url: Option<String>,

    /// Base URL of the external login UI
    #[serde(default = "default_web_url")]
    pub web_url: String,

    /// Secret material for internal key derivation, hashed to 32 bytes
    #[serde(default = "default_key")]
    pub key: String,

    #[serde(default = "default_client_id")]
    pub default_client_id: String,

    /// Force development mode (HTTP redirect URIs, localhost issuers)
    #[serde(default)]
    pub dev: bool,

    /// Refuse the automatic development mode for `http://` issuers
    #[serde(default)]
    pub deny_http: bool,

    #[serde(default)]
    pub dn: DistinguishedNameConfig,

    /// Extra audience added to every request in development mode
    #[serde(default)]
    pub audience_for_test: Option<String>,

    #[serde(default)]
    pub clock_skew_secs: u64,

    #[serde(default = "default_auth_request_ttl")]
    pub auth_request_ttl_secs: u64,

    /// Redirect URIs of the default client (defaults to the web URL)
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Post-logout redirect URIs of the default client (defaults to the web URL)
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,

    #[serde(default)]
    pub clients: Vec<ClientConfig>,
}

fn default_issuer() -> String {
    "http://localhost:8080/".to_string()
}

fn default_web_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_key() -> String {
    "change-me-oidc-crypto-key".to_string()
}

fn default_client_id() -> String {
    "default-client".to_string()
}

fn default_auth_request_ttl() -> u64 {
    30 * 60
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            url: None,
            web_url: default_web_url(),
            key: default_key(),
            default_client_id: default_client_id(),
            dev: false,
            deny_http: false,
            dn: DistinguishedNameConfig::default(),
            audience_for_test: None,
            clock_skew_secs: 0,
            auth_request_ttl_secs: default_auth_request_ttl(),
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            clients: Vec::new(),
        }
    }
}

impl OidcConfig {
    /// Issuer URL with the trailing slash enforced
    pub fn issuer(&self) -> String {
        if self.issuer.ends_with('/') {
            self.issuer.clone()
        } else {
            format!("{}/", self.issuer)
        }
    }

    /// Public URL of the engine, falling back to the issuer
    pub fn public_url(&self) -> String {
        self.url.clone().unwrap_or_else(|| self.issuer())
    }

    /// Path component of the public URL, used as the Rocket mount point
    ///
    /// `https://example.com/` mounts at `/`, `https://example.com/auth/`
    /// mounts at `/auth`.
    pub fn mount_path(&self) -> String {
        let path = Url::parse(&self.public_url())
            .map(|url| url.path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        if path.is_empty() {
            "/".to_string()
        } else {
            path
        }
    }

    /// Host of the issuer, the default audience of every request
    pub fn issuer_host(&self) -> String {
        Url::parse(&self.issuer())
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Whether the server runs in development mode
    ///
    /// Development mode is either forced with `dev`, or enabled automatically
    /// for `http://` issuers unless `deny_http` is set.
    pub fn dev_mode(&self) -> bool {
        self.dev || (self.issuer.starts_with("http://") && !self.deny_http)
    }

    /// Login UI page of the default client
    pub fn login_url(&self) -> String {
        format!("{}/login", self.web_url.trim_end_matches('/'))
    }

    /// Login page template with the request id placeholder
    pub fn login_uri_template(&self) -> String {
        format!("{}?id={{id}}", self.login_url())
    }

    /// 32-byte key derived from the configured secret
    pub fn crypto_key(&self) -> [u8; 32] {
        let digest = Sha256::digest(self.key.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        key
    }

    /// Redirect URIs of the default client
    pub fn default_redirect_uris(&self) -> Vec<String> {
        if self.redirect_uris.is_empty() {
            vec![self.web_url.clone()]
        } else {
            self.redirect_uris.clone()
        }
    }

    /// Post-logout redirect URIs of the default client
    pub fn default_post_logout_redirect_uris(&self) -> Vec<String> {
        if self.post_logout_redirect_uris.is_empty() {
            vec![self.web_url.clone()]
        } else {
            self.post_logout_redirect_uris.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_trailing_slash_is_enforced() {
        let config = OidcConfig {
            issuer: "https://example.com".to_string(),
            ..OidcConfig::default()
        };
        assert_eq!(config.issuer(), "https://example.com/");
        assert_eq!(config.mount_path(), "/");
        assert_eq!(config.issuer_host(), "example.com");
    }

    #[test]
    fn test_mount_path_follows_issuer_path() {
        let config = OidcConfig {
            issuer: "https://example.com/auth".to_string(),
            ..OidcConfig::default()
        };
        assert_eq!(config.issuer(), "https://example.com/auth/");
        assert_eq!(config.mount_path(), "/auth");
    }

    #[test]
    fn test_http_issuer_enables_dev_mode_unless_denied() {
        let mut config = OidcConfig {
            issuer: "http://example.com".to_string(),
            ..OidcConfig::default()
        };
        assert!(config.dev_mode());

        config.deny_http = true;
        assert!(!config.dev_mode());

        config.issuer = "https://example.com/".to_string();
        config.deny_http = false;
        assert!(!config.dev_mode());
    }

    #[test]
    fn test_crypto_key_is_sha256_of_secret() {
        let config = OidcConfig::default();
        let key = config.crypto_key();
        assert_eq!(key.len(), 32);
        assert_eq!(key.as_slice(), Sha256::digest(config.key.as_bytes()).as_slice());
    }

    #[test]
    fn test_login_template_uses_web_url() {
        let config = OidcConfig {
            web_url: "https://web.example.com/".to_string(),
            ..OidcConfig::default()
        };
        assert_eq!(config.login_url(), "https://web.example.com/login");
        assert_eq!(
            config.login_uri_template(),
            "https://web.example.com/login?id={id}"
        );
        assert_eq!(
            config.default_redirect_uris(),
            vec!["https://web.example.com/".to_string()]
        );
    }
}
