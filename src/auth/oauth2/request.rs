// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Authorization request records
//!
//! An [`AuthRequest`] is created by the authorize endpoint, completed by the
//! login handler, receives its code in the callback and is removed when the
//! code is exchanged:
//!
//! ```text
//! Pending --login--> Authorized --callback--> CodeIssued --token--> (removed)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{OidcError, OidcResult};
use super::pkce::CodeChallenge;

/// Scopes present in every request, whatever the client asked for
pub const ESSENTIAL_SCOPES: [&str; 3] = ["openid", "profile", "email"];

/// Progress of an authorization request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Created by authorize, waiting for the login UI
    Pending,
    /// Credentials verified, subject known
    Authorized,
    /// Authorization code assigned, waiting for the token exchange
    CodeIssued,
}

/// Engine-owned record of an in-flight authorization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// UUIDv7 text form; time-ordered
    pub id: String,
    pub client_id: String,
    pub state: String,
    pub nonce: Option<String>,
    pub redirect_uri: String,
    pub response_type: String,
    pub scopes: Vec<String>,
    pub audiences: Vec<String>,
    pub code_challenge: Option<CodeChallenge>,
    pub code: Option<String>,
    pub subject: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Authentication methods used at login
    #[serde(default)]
    pub amr: Vec<String>,
}

/// Parameters accepted by the authorize endpoint, already validated
#[derive(Debug, Clone)]
pub struct NewAuthRequest {
    pub client_id: String,
    pub state: String,
    pub nonce: Option<String>,
    pub redirect_uri: String,
    pub response_type: String,
    pub scopes: Vec<String>,
    pub audiences: Vec<String>,
    pub code_challenge: Option<CodeChallenge>,
}

impl AuthRequest {
    /// Materialize a new pending request with a fresh id
    pub fn new(params: NewAuthRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            client_id: params.client_id,
            state: params.state,
            nonce: params.nonce,
            redirect_uri: params.redirect_uri,
            response_type: params.response_type,
            scopes: params.scopes,
            audiences: params.audiences,
            code_challenge: params.code_challenge,
            code: None,
            subject: None,
            authorized_at: None,
            created_at: now,
            amr: Vec::new(),
        }
    }

    pub fn state(&self) -> RequestState {
        match (&self.subject, &self.code) {
            (Some(_), Some(_)) => RequestState::CodeIssued,
            (Some(_), None) => RequestState::Authorized,
            _ => RequestState::Pending,
        }
    }

    /// Whether the login completed
    pub fn is_done(&self) -> bool {
        self.authorized_at.is_some() && self.subject.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at > ttl
    }

    /// Record a successful login (Pending → Authorized)
    ///
    /// Re-posting the login of an already authorized request overwrites
    /// the subject; once a code is issued the request can no longer change
    /// hands.
    pub fn authorize(&mut self, subject: &str, amr: Vec<String>, now: DateTime<Utc>) -> OidcResult<()> {
        if subject.is_empty() {
            return Err(OidcError::InvalidCredentials("empty subject".to_string()));
        }
        if self.state() == RequestState::CodeIssued && self.subject.as_deref() != Some(subject) {
            return Err(OidcError::InvalidRequest(
                "request already has a code".to_string(),
            ));
        }
        self.subject = Some(subject.to_string());
        self.authorized_at = Some(now);
        self.amr = amr;
        Ok(())
    }

    /// Attach an authorization code (Authorized → CodeIssued)
    pub fn issue_code(&mut self, code: String) -> OidcResult<()> {
        if !self.is_done() {
            return Err(OidcError::InvalidRequest(
                "request is not authorized".to_string(),
            ));
        }
        self.code = Some(code);
        Ok(())
    }

    /// Space-separated scope string
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Split a scope parameter and force the essential scopes
///
/// Duplicates are dropped, the requested order is kept, and missing
/// essential scopes are appended. The essential set is forced even when the
/// client did not ask for `profile` or `email`.
pub fn normalize_scopes(requested: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for scope in requested.split_whitespace() {
        if !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_string());
        }
    }
    for essential in ESSENTIAL_SCOPES {
        if !scopes.iter().any(|s| s == essential) {
            scopes.push(essential.to_string());
        }
    }
    scopes
}
