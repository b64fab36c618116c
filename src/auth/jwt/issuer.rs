// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JWT issuer for access and ID tokens
//!
//! Times follow one rule for every token: `iat = now - clock_skew`,
//! `nbf = iat`, `exp = iat + lifetime`.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, Validation};
use log::debug;
use rsa::sha2::{Digest, Sha256};
use uuid::Uuid;

use super::claims::{AccessTokenClaims, IdTokenClaims, RefreshTokenClaims};
use super::keys::KeyMaterial;
use crate::auth::oauth2::client::Client;
use crate::auth::oauth2::error::{OidcError, OidcResult};
use crate::auth::oauth2::userinfo::UserInfoResponse;
use crate::auth::oauth2::AuthRequest;

/// Authorization context shared by every token of a grant
///
/// Built from a completed authorization request on the code exchange, or
/// from verified refresh token claims on rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantContext {
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub audiences: Vec<String>,
    pub nonce: Option<String>,
    pub auth_time: i64,
    pub amr: Vec<String>,
}

impl GrantContext {
    pub fn from_request(request: &AuthRequest) -> OidcResult<Self> {
        let (Some(subject), Some(authorized_at)) = (&request.subject, request.authorized_at) else {
            return Err(OidcError::InvalidGrant("request is not authorized".to_string()));
        };
        Ok(Self {
            subject: subject.clone(),
            client_id: request.client_id.clone(),
            scopes: request.scopes.clone(),
            audiences: request.audiences.clone(),
            nonce: request.nonce.clone(),
            auth_time: authorized_at.timestamp(),
            amr: request.amr.clone(),
        })
    }

    pub fn from_refresh(claims: &RefreshTokenClaims) -> Self {
        Self {
            subject: claims.sub.clone(),
            client_id: claims.client_id.clone(),
            scopes: claims.scopes(),
            audiences: claims.aud.clone(),
            nonce: None,
            auth_time: claims.auth_time,
            amr: claims.amr.clone(),
        }
    }

    /// Token audience, defaulting to the client id
    pub fn audience(&self) -> Vec<String> {
        if self.audiences.is_empty() {
            vec![self.client_id.clone()]
        } else {
            self.audiences.clone()
        }
    }
}

/// `iat`/`exp` pair for a lifetime
pub fn token_times(now: DateTime<Utc>, clock_skew: Duration, lifetime: Duration) -> (i64, i64) {
    let iat = now - clock_skew;
    (iat.timestamp(), (iat + lifetime).timestamp())
}

/// Left half of the SHA-256 of the access token, base64url without padding
pub fn at_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// Signs access and ID tokens with the server key
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyMaterial>,
    issuer: String,
    /// Leeway applied when verifying `exp`
    leeway: u64,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyMaterial>, issuer: impl Into<String>, leeway: u64) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            leeway,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn keys(&self) -> &KeyMaterial {
        &self.keys
    }

    /// RS256 validation bound to this issuer
    pub fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Audiences are checked against the client by the engine
        validation.validate_aud = false;
        validation.leeway = self.leeway;
        validation
    }

    /// Mint a JWT access token
    ///
    /// ### Returns
    ///
    /// The signed token and its claims
    pub fn mint_access_token(
        &self,
        context: &GrantContext,
        client: &Client,
        now: DateTime<Utc>,
    ) -> OidcResult<(String, AccessTokenClaims)> {
        let (iat, exp) = token_times(now, client.clock_skew, client.access_token_lifetime);
        let scopes = client.restrict_additional_access_token_scopes(&context.scopes);
        let claims = AccessTokenClaims {
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            sub: context.subject.clone(),
            aud: context.audience(),
            iat,
            nbf: iat,
            exp,
            client_id: context.client_id.clone(),
            scope: scopes.join(" "),
        };
        let token = jsonwebtoken::encode(&self.keys.header(), &claims, self.keys.encoding_key())?;
        debug!("Issued access token {} for client {}", claims.jti, claims.client_id);
        Ok((token, claims))
    }

    /// Mint an ID token bound to `access_token` through `at_hash`
    ///
    /// `profile` carries the claims the profile provider released for the
    /// ID token scopes; `sub` always comes from the grant.
    pub fn mint_id_token(
        &self,
        context: &GrantContext,
        client: &Client,
        access_token: &str,
        profile: &UserInfoResponse,
        now: DateTime<Utc>,
    ) -> OidcResult<String> {
        let (iat, exp) = token_times(now, client.clock_skew, client.id_token_lifetime);
        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: context.subject.clone(),
            aud: vec![context.client_id.clone()],
            iat,
            exp,
            auth_time: context.auth_time,
            nonce: context.nonce.clone(),
            amr: context.amr.clone(),
            azp: context.client_id.clone(),
            at_hash: at_hash(access_token),
            email: profile.email.clone(),
            email_verified: profile.email_verified,
            name: profile.name.clone(),
        };
        Ok(jsonwebtoken::encode(
            &self.keys.header(),
            &claims,
            self.keys.encoding_key(),
        )?)
    }

    /// Verify an access token issued by this server
    ///
    /// Every failure collapses to [`OidcError::InvalidToken`].
    pub fn verify_access_token(&self, token: &str) -> OidcResult<AccessTokenClaims> {
        self.keys
            .verify::<AccessTokenClaims>(token, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Access token rejected: {}", e);
                OidcError::InvalidToken
            })
    }
}
