// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OpenID Connect protocol engine
//!
//! [`OidcProvider`] implements the endpoint semantics independently of the
//! HTTP framework. Each operation takes already extracted parameters and
//! returns either a redirect location or a response body; the Rocket
//! handlers in [`crate::server`] only translate those into responses.
//!
//! The engine is wired from three independently built values: the request
//! store, the user repository and the token issuer (which owns the key
//! material).

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::jwk::JwkSet;
use log::{debug, info, warn};
use rsa::sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use url::Url;

use super::client::{AuthMethod, Client, ClientRegistry, GrantType};
use super::error::{ErrorKind, OidcError, OidcResult};
use super::pkce::{CodeChallenge, CodeChallengeMethod};
use super::request::{normalize_scopes, AuthRequest, NewAuthRequest};
use super::userinfo::{UserInfoResponse, UserInfoSink};
use super::users::{UserRepo, UserRepoError};
use crate::auth::jwt::{GrantContext, RefreshTokenCodec, TokenIssuer};
use crate::config::OidcConfig;
use crate::storage::RequestRepo;

/// Login error for an unknown or expired request id
pub const LOGIN_ERROR_BAD_REQUEST: &str = "Invalid request.";
/// Login error for a blank username or password
pub const LOGIN_ERROR_EMPTY_FIELD: &str = "Please enter your ID and password.";
/// Login error for rejected credentials.
/// The "Invalid s ID" typo is relied upon verbatim by existing login UIs.
pub const LOGIN_ERROR_INVALID_CREDENTIALS: &str = "Login failed; Invalid s ID or password.";

/// Authentication method recorded after a password login
pub const AMR_PASSWORD: &str = "pwd";

/// Engine settings derived from the configuration
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Issuer URL with trailing slash
    pub issuer: String,
    pub issuer_host: String,
    pub audience_for_test: Option<String>,
    pub dev_mode: bool,
    /// SHA-256 of the configured key, mixed into authorization codes
    pub crypto_key: [u8; 32],
    /// Login UI page used when the request (and so the client) is unknown
    pub login_url: String,
    pub web_url: String,
    pub auth_request_ttl: Duration,
}

impl ProviderSettings {
    pub fn from_config(config: &OidcConfig) -> Self {
        Self {
            issuer: config.issuer(),
            issuer_host: config.issuer_host(),
            audience_for_test: config.audience_for_test.clone(),
            dev_mode: config.dev_mode(),
            crypto_key: config.crypto_key(),
            login_url: config.login_url(),
            web_url: config.web_url.clone(),
            auth_request_ttl: Duration::seconds(config.auth_request_ttl_secs as i64),
        }
    }

    /// Absolute URL of an endpoint below the issuer
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.issuer.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Query parameters of the authorization endpoint
#[derive(Debug, Clone, Default)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Fields posted by the login UI
#[derive(Debug, Clone, Default)]
pub struct LoginParams {
    pub username: Option<String>,
    pub password: Option<String>,
    pub id: Option<String>,
}

/// Parameters of the token endpoint, for every grant type
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenParams {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Successful token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// OpenID Provider metadata
///
/// References:
/// - https://openid.net/specs/openid-connect-discovery-1_0.html#ProviderMetadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub end_session_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub request_uri_parameter_supported: bool,
}

/// Build a login UI redirect
///
/// The existing query parameters of `base` are kept, `id` is overwritten,
/// and `error` is only set when present. Keys are encoded in sorted order.
pub fn redirect_url(base: &str, id: Option<&str>, error: Option<&str>) -> String {
    let Ok(mut url) = Url::parse(base) else {
        warn!("Login redirect base is not a valid URL: {}", base);
        return base.to_string();
    };

    let mut params: BTreeMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if let Some(id) = id {
        params.insert("id".to_string(), id.to_string());
    }
    if let Some(error) = error {
        params.insert("error".to_string(), error.to_string());
    }

    if params.is_empty() {
        url.set_query(None);
    } else {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        url.set_query(Some(&query));
    }
    url.to_string()
}

/// Append query parameters to a client redirect URI without normalizing it
fn append_query(base: &str, pairs: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}

/// The OpenID Connect engine
pub struct OidcProvider {
    settings: ProviderSettings,
    clients: ClientRegistry,
    requests: Arc<dyn RequestRepo>,
    users: Arc<dyn UserRepo>,
    tokens: TokenIssuer,
    refresh: RefreshTokenCodec,
}

impl OidcProvider {
    pub fn new(
        settings: ProviderSettings,
        clients: ClientRegistry,
        requests: Arc<dyn RequestRepo>,
        users: Arc<dyn UserRepo>,
        tokens: TokenIssuer,
    ) -> Self {
        let refresh = RefreshTokenCodec::new(tokens.clone());
        Self {
            settings,
            clients,
            requests,
            users,
            tokens,
            refresh,
        }
    }

    /// Login UI page for generic errors
    pub fn login_url(&self) -> &str {
        &self.settings.login_url
    }

    /// Validate an authorization request and persist it as pending
    ///
    /// ### Returns
    ///
    /// The login UI location with the new request id
    pub async fn authorize(&self, params: AuthorizeParams) -> OidcResult<String> {
        let client_id = params
            .client_id
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OidcError::InvalidRequest("client_id is required".to_string()))?;
        let client = self
            .clients
            .get(&client_id)
            .map_err(|_| OidcError::InvalidClient(format!("unknown client {client_id}")))?;

        let redirect_uri = params
            .redirect_uri
            .ok_or_else(|| OidcError::InvalidRequest("redirect_uri is required".to_string()))?;
        if !client.is_redirect_uri_allowed(&redirect_uri) {
            return Err(OidcError::InvalidRequest(format!(
                "redirect_uri {redirect_uri} is not registered"
            )));
        }

        let response_type = params.response_type.unwrap_or_default();
        if !client.supports_response_type(&response_type) {
            return Err(OidcError::UnsupportedResponseType(response_type));
        }

        let requested = params.scope.unwrap_or_default();
        if let Some(scope) = requested
            .split_whitespace()
            .find(|scope| !client.is_scope_allowed(scope))
        {
            return Err(OidcError::InvalidScope(scope.to_string()));
        }

        let code_challenge = match params.code_challenge.filter(|c| !c.is_empty()) {
            Some(challenge) => {
                let method = match params.code_challenge_method.as_deref() {
                    None | Some("") => CodeChallengeMethod::Plain,
                    Some(method) => method.parse().map_err(OidcError::InvalidRequest)?,
                };
                Some(CodeChallenge { challenge, method })
            }
            None if client.auth_method == AuthMethod::None => {
                return Err(OidcError::InvalidRequest(
                    "code_challenge is required for public clients".to_string(),
                ))
            }
            None => None,
        };

        let mut audiences = vec![self.settings.issuer_host.clone()];
        if self.settings.dev_mode {
            if let Some(aud) = &self.settings.audience_for_test {
                audiences.push(aud.clone());
            }
        }
        audiences.retain(|aud| !aud.is_empty());

        let now = Utc::now();
        self.purge_expired(now).await;

        let request = AuthRequest::new(
            NewAuthRequest {
                client_id: client.id.clone(),
                state: params.state.unwrap_or_default(),
                nonce: params.nonce.filter(|n| !n.is_empty()),
                redirect_uri,
                response_type,
                scopes: normalize_scopes(&requested),
                audiences,
                code_challenge,
            },
            now,
        );
        self.requests.save(&request).await?;
        info!(
            "Authorization request {} created for client {}",
            request.id, client.id
        );

        Ok(client.login_uri(&request.id))
    }

    /// Drop requests abandoned for longer than the request TTL
    ///
    /// Runs on every new authorization so that unfinished flows cannot pile
    /// up. A failing purge is logged and does not block the new request.
    async fn purge_expired(&self, now: DateTime<Utc>) {
        match self
            .requests
            .purge_created_before(now - self.settings.auth_request_ttl)
            .await
        {
            Ok(0) => {}
            Ok(purged) => debug!("Purged {} expired authorization requests", purged),
            Err(e) => warn!("Failed to purge expired authorization requests: {}", e),
        }
    }

    /// Load a live request; expired requests are removed and reported as not found
    async fn live_request(&self, id: &str) -> OidcResult<AuthRequest> {
        let request = self.requests.find_by_id(id).await?;
        if request.is_expired(self.settings.auth_request_ttl, Utc::now()) {
            debug!("Authorization request {} expired", id);
            let _ = self.requests.remove(id).await;
            return Err(OidcError::NotFound(format!("request {id}")));
        }
        Ok(request)
    }

    /// Handle the credentials posted by the login UI
    ///
    /// Every outcome is a redirect: back to the login UI with a message from
    /// a fixed set, or on to the authorize callback. Only internal failures
    /// are returned as errors.
    pub async fn login(&self, params: LoginParams) -> OidcResult<String> {
        let id = params.id.unwrap_or_default();

        let mut request = match self.live_request(&id).await {
            Ok(request) => request,
            Err(e) if e.kind() == ErrorKind::Internal => return Err(e),
            Err(e) => {
                debug!("Login for unusable request: {}", e);
                return Ok(redirect_url(
                    &self.settings.login_url,
                    Some(&id),
                    Some(LOGIN_ERROR_BAD_REQUEST),
                ));
            }
        };
        let login_base = match self.clients.get(&request.client_id) {
            Ok(client) => client.login_uri(&request.id),
            Err(_) => self.settings.login_url.clone(),
        };

        let username = params.username.unwrap_or_default();
        let password = params.password.unwrap_or_default();
        if username.trim().is_empty() || password.is_empty() {
            return Ok(redirect_url(
                &login_base,
                Some(&id),
                Some(LOGIN_ERROR_EMPTY_FIELD),
            ));
        }

        let subject = match self.users.subject(&username, &password, &request.id).await {
            Ok(subject) if !subject.is_empty() => subject,
            Ok(_) => {
                debug!("Credential provider returned an empty subject for {}", id);
                return Ok(redirect_url(
                    &login_base,
                    Some(&id),
                    Some(LOGIN_ERROR_INVALID_CREDENTIALS),
                ));
            }
            Err(e) => {
                match e {
                    UserRepoError::Backend(ref cause) => {
                        warn!("Credential provider failure for {}: {}", id, cause)
                    }
                    _ => debug!("Credentials rejected for {}", id),
                }
                return Ok(redirect_url(
                    &login_base,
                    Some(&id),
                    Some(LOGIN_ERROR_INVALID_CREDENTIALS),
                ));
            }
        };

        if let Err(e) = request.authorize(&subject, vec![AMR_PASSWORD.to_string()], Utc::now()) {
            debug!("Login refused for {}: {}", id, e);
            return Ok(redirect_url(
                &login_base,
                Some(&id),
                Some(LOGIN_ERROR_BAD_REQUEST),
            ));
        }
        self.requests.save(&request).await?;
        info!("Request {} authorized", request.id);

        Ok(redirect_url(
            &self.settings.endpoint("authorize/callback"),
            Some(&request.id),
            None,
        ))
    }

    /// Derive a fresh authorization code for a request
    fn generate_code(&self, request_id: &str) -> String {
        let nonce: [u8; 32] = rand::random();
        let mut hasher = Sha256::new();
        hasher.update(self.settings.crypto_key);
        hasher.update(request_id.as_bytes());
        hasher.update(nonce);
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Issue the authorization code of an authorized request
    ///
    /// ### Returns
    ///
    /// The client redirect URI with `code` and `state` appended
    pub async fn callback(&self, id: &str) -> OidcResult<String> {
        let mut request = self.live_request(id).await?;
        let code = self.generate_code(&request.id);
        request.issue_code(code.clone())?;
        self.requests.save(&request).await?;
        debug!("Authorization code issued for request {}", request.id);

        let mut pairs = vec![("code", code.as_str())];
        if !request.state.is_empty() {
            pairs.push(("state", request.state.as_str()));
        }
        Ok(append_query(&request.redirect_uri, &pairs))
    }

    /// Token endpoint
    pub async fn token(&self, params: TokenParams) -> OidcResult<TokenResponse> {
        match params.grant_type.as_deref() {
            Some("authorization_code") => self.exchange_code(params).await,
            Some("refresh_token") => self.exchange_refresh_token(params).await,
            Some(other) => Err(OidcError::UnsupportedGrantType(other.to_string())),
            None => Err(OidcError::InvalidRequest("grant_type is required".to_string())),
        }
    }

    async fn exchange_code(&self, params: TokenParams) -> OidcResult<TokenResponse> {
        let require = |value: Option<String>, name: &str| {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| OidcError::InvalidRequest(format!("{name} is required")))
        };
        let code = require(params.code, "code")?;
        let redirect_uri = require(params.redirect_uri, "redirect_uri")?;
        let client_id = require(params.client_id, "client_id")?;
        let code_verifier = require(params.code_verifier, "code_verifier")?;

        let request = match self.requests.find_by_code(&code).await {
            Ok(request) => request,
            Err(crate::storage::StorageError::NotFound) => {
                return Err(OidcError::InvalidGrant("unknown code".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if request.is_expired(self.settings.auth_request_ttl, Utc::now()) {
            let _ = self.requests.remove(&request.id).await;
            return Err(OidcError::InvalidGrant("request expired".to_string()));
        }

        let client = self
            .clients
            .get(&client_id)
            .map_err(|_| OidcError::InvalidClient(format!("unknown client {client_id}")))?;
        if !client.supports_grant_type(GrantType::AuthorizationCode) {
            return Err(OidcError::InvalidGrant("grant type not allowed".to_string()));
        }
        if request.client_id != client.id {
            return Err(OidcError::InvalidGrant("client mismatch".to_string()));
        }
        if request.redirect_uri != redirect_uri {
            return Err(OidcError::InvalidGrant("redirect_uri mismatch".to_string()));
        }
        let pkce_ok = request
            .code_challenge
            .as_ref()
            .is_some_and(|challenge| challenge.verify(&code_verifier));
        if !pkce_ok {
            return Err(OidcError::InvalidGrant("PKCE verification failed".to_string()));
        }
        let context = GrantContext::from_request(&request)?;

        // Consume the request before minting so that a replayed code loses the race
        match self.requests.remove(&request.id).await {
            Ok(()) => {}
            Err(crate::storage::StorageError::NotFound) => {
                return Err(OidcError::InvalidGrant("code already used".to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        let mut response = self.mint_tokens(&context, None, client).await?;
        info!(
            "Code exchanged for request {} (client {})",
            request.id, client.id
        );
        if !request.state.is_empty() {
            response.state = Some(request.state);
        }
        Ok(response)
    }

    async fn exchange_refresh_token(&self, params: TokenParams) -> OidcResult<TokenResponse> {
        let token = params
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OidcError::InvalidRequest("refresh_token is required".to_string()))?;

        let claims = self
            .refresh
            .verify(&token)
            .map_err(|_| OidcError::InvalidGrant("invalid refresh token".to_string()))?;

        let client = self
            .clients
            .get(&claims.client_id)
            .map_err(|_| OidcError::InvalidClient(format!("unknown client {}", claims.client_id)))?;
        if let Some(client_id) = params.client_id.filter(|c| !c.is_empty()) {
            if client_id != claims.client_id {
                return Err(OidcError::InvalidGrant("client mismatch".to_string()));
            }
        }
        if !client.supports_grant_type(GrantType::RefreshToken) {
            return Err(OidcError::InvalidGrant("grant type not allowed".to_string()));
        }

        let context = GrantContext::from_refresh(&claims);
        let response = self
            .mint_tokens(&context, Some(&claims.auth_id), client)
            .await?;
        debug!("Refresh token rotated for auth {}", claims.auth_id);
        Ok(response)
    }

    /// Mint access, ID and refresh tokens for a grant
    async fn mint_tokens(
        &self,
        context: &GrantContext,
        auth_id: Option<&str>,
        client: &Client,
    ) -> OidcResult<TokenResponse> {
        let now = Utc::now();

        let mut profile = UserInfoResponse::default();
        let id_token_scopes = client.restrict_additional_id_token_scopes(&context.scopes);
        self.users
            .info(&context.subject, &id_token_scopes, &mut profile)
            .await
            .map_err(|e| match e {
                UserRepoError::Backend(cause) => OidcError::Internal(cause),
                other => OidcError::InvalidGrant(other.to_string()),
            })?;

        let (access_token, access_claims) = self.tokens.mint_access_token(context, client, now)?;
        let id_token = self
            .tokens
            .mint_id_token(context, client, &access_token, &profile, now)?;
        let (refresh_token, _) = self.refresh.mint(context, auth_id, client, now)?;

        Ok(TokenResponse {
            access_token,
            id_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: access_claims.exp - now.timestamp(),
            state: None,
        })
    }

    /// Claims of the subject of a bearer access token
    ///
    /// `sub` is written after the profile provider returns.
    pub async fn userinfo(&self, access_token: &str) -> OidcResult<UserInfoResponse> {
        let claims = self.tokens.verify_access_token(access_token)?;
        self.clients
            .get(&claims.client_id)
            .map_err(|_| OidcError::InvalidToken)?;

        let scopes: Vec<String> = claims.scope.split_whitespace().map(str::to_string).collect();
        let mut response = UserInfoResponse::default();
        self.users
            .info(&claims.sub, &scopes, &mut response)
            .await
            .map_err(|e| match e {
                UserRepoError::Backend(cause) => OidcError::Internal(cause),
                _ => OidcError::InvalidToken,
            })?;
        response.set_subject(&claims.sub);
        Ok(response)
    }

    /// Current JWK set
    pub fn jwks(&self) -> &JwkSet {
        self.tokens.keys().jwks()
    }

    /// Discovery document
    pub fn discovery(&self) -> OpenIdConfiguration {
        let strings = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        OpenIdConfiguration {
            issuer: self.settings.issuer.clone(),
            authorization_endpoint: self.settings.endpoint("authorize"),
            token_endpoint: self.settings.endpoint("oauth/token"),
            userinfo_endpoint: self.settings.endpoint("userinfo"),
            jwks_uri: self.settings.endpoint("jwks.json"),
            end_session_endpoint: self.settings.endpoint("api/logout"),
            scopes_supported: strings(&super::client::DEFAULT_ALLOWED_SCOPES),
            response_types_supported: strings(&["code"]),
            response_modes_supported: strings(&["query"]),
            grant_types_supported: strings(&[
                GrantType::AuthorizationCode.as_str(),
                GrantType::RefreshToken.as_str(),
            ]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&["RS256"]),
            token_endpoint_auth_methods_supported: strings(&["none"]),
            code_challenge_methods_supported: strings(&["S256", "plain"]),
            claims_supported: strings(&[
                "sub",
                "iss",
                "aud",
                "exp",
                "iat",
                "auth_time",
                "nonce",
                "amr",
                "azp",
                "at_hash",
                "name",
                "email",
                "email_verified",
            ]),
            request_uri_parameter_supported: false,
        }
    }

    /// Where to send the user agent after logout
    ///
    /// `return_to` is not checked against the registered post-logout
    /// redirect URIs, which makes this an open redirect.
    pub fn end_session(&self, return_to: Option<String>) -> String {
        return_to
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.settings.web_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_url_preserves_query_and_sorts_keys() {
        assert_eq!(
            redirect_url(
                "https://web.example.com/login",
                Some("R"),
                Some(LOGIN_ERROR_INVALID_CREDENTIALS)
            ),
            "https://web.example.com/login?error=Login+failed%3B+Invalid+s+ID+or+password.&id=R"
        );
        assert_eq!(
            redirect_url("https://web.example.com/login?lang=ja&id=old", Some("new"), None),
            "https://web.example.com/login?id=new&lang=ja"
        );
        assert_eq!(
            redirect_url("https://example.com/authorize/callback", Some("R"), None),
            "https://example.com/authorize/callback?id=R"
        );
    }

    #[test]
    fn test_append_query_keeps_redirect_uri_verbatim() {
        assert_eq!(
            append_query("https://web.example.com", &[("code", "K"), ("state", "hogestate")]),
            "https://web.example.com?code=K&state=hogestate"
        );
        assert_eq!(
            append_query("https://web.example.com/cb?x=1", &[("code", "K")]),
            "https://web.example.com/cb?x=1&code=K"
        );
    }

    #[test]
    fn test_endpoints_have_single_slash() {
        let settings = ProviderSettings::from_config(&OidcConfig {
            issuer: "https://example.com".to_string(),
            ..OidcConfig::default()
        });
        assert_eq!(settings.endpoint("jwks.json"), "https://example.com/jwks.json");
        assert_eq!(settings.endpoint("/api/logout"), "https://example.com/api/logout");
    }
}
