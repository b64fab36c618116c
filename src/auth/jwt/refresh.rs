// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Self-contained refresh tokens
//!
//! Refresh tokens are RS256 JWTs carrying the whole authorization context,
//! so the server keeps no refresh token state. The flip side is that they
//! cannot be revoked before they expire; rotation on every refresh and the
//! 24 hour lifetime bound their usefulness.

use chrono::{DateTime, Utc};
use log::debug;
use uuid::Uuid;

use super::claims::RefreshTokenClaims;
use super::issuer::{token_times, GrantContext, TokenIssuer};
use crate::auth::oauth2::client::Client;
use crate::auth::oauth2::error::{OidcError, OidcResult};

/// Mints and verifies refresh tokens with the server key
#[derive(Debug, Clone)]
pub struct RefreshTokenCodec {
    issuer: TokenIssuer,
}

impl RefreshTokenCodec {
    pub fn new(issuer: TokenIssuer) -> Self {
        Self { issuer }
    }

    /// Mint a refresh token
    ///
    /// ### Arguments
    ///
    /// * `context` - Authorization context of the grant
    /// * `auth_id` - Correlator of a previous refresh token; `None` on the
    ///   first issuance generates a new one
    /// * `client` - Client the token is issued to
    /// * `now` - Issuance time
    pub fn mint(
        &self,
        context: &GrantContext,
        auth_id: Option<&str>,
        client: &Client,
        now: DateTime<Utc>,
    ) -> OidcResult<(String, RefreshTokenClaims)> {
        let (iat, _) = token_times(now, client.clock_skew, client.refresh_token_lifetime);
        let claims = RefreshTokenClaims {
            jti: Uuid::new_v4().to_string(),
            auth_id: auth_id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            amr: context.amr.clone(),
            iss: self.issuer.issuer().to_string(),
            sub: context.subject.clone(),
            scope: context.scopes.join(" "),
            aud: context.audience(),
            iat,
            exp: (now + client.refresh_token_lifetime).timestamp(),
            client_id: context.client_id.clone(),
            auth_time: context.auth_time,
        };
        let keys = self.issuer.keys();
        let token = jsonwebtoken::encode(&keys.header(), &claims, keys.encoding_key())?;
        debug!(
            "Issued refresh token {} (auth {}) for client {}",
            claims.jti, claims.auth_id, claims.client_id
        );
        Ok((token, claims))
    }

    /// Verify a refresh token
    ///
    /// Checks the RS256 header, the kid against the JWK set, the signature,
    /// `iss` and `exp`. The cause of a failure is only logged.
    pub fn verify(&self, token: &str) -> OidcResult<RefreshTokenClaims> {
        self.issuer
            .keys()
            .verify::<RefreshTokenClaims>(token, &self.issuer.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Refresh token rejected: {}", e);
                OidcError::InvalidToken
            })
    }
}
