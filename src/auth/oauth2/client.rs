// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Static client registry
//!
//! Clients are first-party public web applications using the authorization
//! code flow with PKCE. They are built from the configuration at startup and
//! never change afterwards.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use log::{debug, info};
use url::Url;

use super::error::{OidcError, OidcResult};
use crate::config::{ClientConfig, OidcConfig};

/// Scopes every client may request
pub const DEFAULT_ALLOWED_SCOPES: [&str; 4] = ["openid", "profile", "email", "offline_access"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    Web,
}

/// Client authentication method at the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Public client, PKCE only
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenType {
    Jwt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Immutable client descriptor
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub application_type: ApplicationType,
    pub auth_method: AuthMethod,
    pub access_token_type: AccessTokenType,
    pub response_types: Vec<String>,
    pub grant_types: Vec<GrantType>,
    pub allowed_scopes: Vec<String>,
    /// Exact-match list
    pub redirect_uris: Vec<String>,
    /// Exact-match list
    pub post_logout_redirect_uris: Vec<String>,
    /// Login UI URL with a single `{id}` placeholder
    pub login_uri_template: String,
    pub id_token_lifetime: Duration,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub clock_skew: Duration,
    /// Tolerates HTTP redirect URIs and localhost issuers
    pub dev_mode: bool,
}

impl Client {
    /// Build a web client with the standard policy
    pub fn web(
        id: &str,
        redirect_uris: Vec<String>,
        post_logout_redirect_uris: Vec<String>,
        login_uri_template: String,
        clock_skew: Duration,
        dev_mode: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            application_type: ApplicationType::Web,
            auth_method: AuthMethod::None,
            access_token_type: AccessTokenType::Jwt,
            response_types: vec!["code".to_string()],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            allowed_scopes: DEFAULT_ALLOWED_SCOPES.iter().map(|s| s.to_string()).collect(),
            redirect_uris,
            post_logout_redirect_uris,
            login_uri_template,
            id_token_lifetime: Duration::minutes(5),
            access_token_lifetime: Duration::minutes(5),
            refresh_token_lifetime: Duration::hours(24),
            clock_skew,
            dev_mode,
        }
    }

    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.allowed_scopes.iter().any(|s| s == scope)
    }

    pub fn is_redirect_uri_allowed(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    pub fn supports_response_type(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|t| t == response_type)
    }

    pub fn supports_grant_type(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Login UI URL for a request id
    pub fn login_uri(&self, request_id: &str) -> String {
        self.login_uri_template.replace("{id}", request_id)
    }

    /// Scopes allowed to flow into the ID token
    pub fn restrict_additional_id_token_scopes(&self, scopes: &[String]) -> Vec<String> {
        scopes.to_vec()
    }

    /// Scopes allowed to flow into the access token
    pub fn restrict_additional_access_token_scopes(&self, scopes: &[String]) -> Vec<String> {
        scopes.to_vec()
    }

    fn validate(&self) -> Result<()> {
        if self.login_uri_template.matches("{id}").count() != 1 {
            bail!(
                "Client {}: login URI template must contain exactly one {{id}} placeholder",
                self.id
            );
        }
        for uri in self.redirect_uris.iter().chain(&self.post_logout_redirect_uris) {
            let url = Url::parse(uri)
                .with_context(|| format!("Client {}: invalid redirect URI {}", self.id, uri))?;
            if url.scheme() != "https" && !self.dev_mode {
                bail!(
                    "Client {}: redirect URI {} must use https outside development mode",
                    self.id,
                    uri
                );
            }
        }
        Ok(())
    }
}

/// Lookup table of the registered clients
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    /// Build the default client and the extra configured clients
    ///
    /// Fails when a client is declared twice or when a non-development client
    /// uses a non-https redirect URI.
    pub fn from_config(config: &OidcConfig) -> Result<Self> {
        let dev_mode = config.dev_mode();
        let clock_skew = Duration::seconds(config.clock_skew_secs as i64);

        let mut registry = Self::default();
        registry.register(Client::web(
            &config.default_client_id,
            config.default_redirect_uris(),
            config.default_post_logout_redirect_uris(),
            config.login_uri_template(),
            clock_skew,
            dev_mode,
        ))?;

        for ClientConfig {
            client_id,
            redirect_uris,
            post_logout_redirect_uris,
            login_uri_template,
        } in &config.clients
        {
            registry.register(Client::web(
                client_id,
                redirect_uris.clone(),
                post_logout_redirect_uris.clone(),
                login_uri_template
                    .clone()
                    .unwrap_or_else(|| config.login_uri_template()),
                clock_skew,
                dev_mode,
            ))?;
        }

        info!(
            "Registered {} client(s), development mode {}",
            registry.clients.len(),
            if dev_mode { "on" } else { "off" }
        );
        Ok(registry)
    }

    /// Add a client; duplicate ids are rejected
    pub fn register(&mut self, client: Client) -> Result<()> {
        client.validate()?;
        if self.clients.contains_key(&client.id) {
            bail!("Client {} is declared twice", client.id);
        }
        debug!("Registering client {}", client.id);
        self.clients.insert(client.id.clone(), client);
        Ok(())
    }

    pub fn get(&self, client_id: &str) -> OidcResult<&Client> {
        self.clients
            .get(client_id)
            .ok_or_else(|| OidcError::NotFound(format!("client {client_id}")))
    }
}
