// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP surface of the OpenID provider
//!
//! | Path | Method | Purpose |
//! |------|--------|---------|
//! | `/authorize` | GET | Start of the authorization code flow |
//! | `/authorize/callback` | GET | Code issuance after login |
//! | `/oauth/token` | POST | Code exchange and refresh rotation |
//! | `/userinfo` | GET, POST | Claims of the bearer's subject |
//! | `/jwks.json` | GET | JWK set |
//! | `/.well-known/openid-configuration` | GET | Discovery document |
//! | `/api/login` | POST | Credentials from the external login UI |
//! | `/api/logout`, `/v2/logout` | GET | End session |
//!
//! All paths are relative to the path of the public URL.

pub mod builder;
pub mod forms;
pub mod guards;
pub mod handlers;
pub mod oidc;
pub mod responses;

pub use self::builder::{
    build_figment, build_rocket, build_rocket_with_provider, config_repo, init_provider,
    init_provider_with,
};
pub use self::handlers::RequestDeadline;
