// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Embedded OpenID Connect authorization server
//!
//! Issues ID, access and refresh tokens to first-party web clients through
//! the authorization code flow with PKCE. Tokens are signed with an RS256 key
//! whose self-signed certificate is persisted across restarts.
//!
//! - [`config`]: YAML configuration validated against a JSON schema
//! - [`storage`]: authorization request store and key material persistence
//! - [`auth`]: signing keys, token formats and the protocol engine
//! - [`server`]: Rocket routes and wiring
//! - [`utility`]: key pair and certificate generation

pub mod auth;
pub mod config;
pub mod server;
pub mod storage;
pub mod utility;
