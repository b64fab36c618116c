// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OpenID Connect discovery endpoints
//!
//! - `.well-known/openid-configuration` discovery document
//! - `jwks.json` with the public part of the signing key
//!
//! These endpoints allow clients to discover the server's capabilities and
//! verify the RS256 signatures of the tokens it issues.

use std::sync::Arc;

use jsonwebtoken::jwk::JwkSet;
use log::debug;
use rocket::serde::json::Json;
use rocket::{get, State};

use crate::auth::oauth2::{OidcProvider, OpenIdConfiguration};

/// OpenID Connect discovery document
#[get("/.well-known/openid-configuration")]
pub fn openid_configuration(provider: &State<Arc<OidcProvider>>) -> Json<OpenIdConfiguration> {
    debug!("Serving OpenID configuration");
    Json(provider.discovery())
}

/// JSON Web Key Set
#[get("/jwks.json")]
pub fn jwks(provider: &State<Arc<OidcProvider>>) -> Json<JwkSet> {
    Json(provider.jwks().clone())
}
