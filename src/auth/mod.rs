// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Authorization server core
//!
//! [`jwt`] owns the signing key and the token formats, [`oauth2`] the
//! protocol engine built on top of it.

pub mod jwt;
pub mod oauth2;

pub use oauth2::{OidcError, OidcProvider, OidcResult};
