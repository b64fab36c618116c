// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JSON Web Tokens
//!
//! - [`keys`]: the RS256 signing key, its certificate and the JWK set
//! - [`claims`]: access, ID and refresh token claims
//! - [`issuer`]: minting and verification of access and ID tokens
//! - [`refresh`]: self-contained refresh tokens

pub mod claims;
pub mod issuer;
pub mod keys;
pub mod refresh;

pub use claims::{AccessTokenClaims, IdTokenClaims, RefreshTokenClaims};
pub use issuer::{at_hash, GrantContext, TokenIssuer};
pub use keys::{KeyMaterial, SIGNING_KEY_ID};
pub use refresh::RefreshTokenCodec;
