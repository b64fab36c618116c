// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # OAuth 2.0 / OpenID Connect engine
//!
//! ## Module Structure
//!
//! - [`client`] - Static client registry and per-client policy
//! - [`error`] - Protocol errors and their wire representation
//! - [`pkce`] - Proof Key for Code Exchange
//! - [`request`] - Authorization request records
//! - [`userinfo`] - UserInfo claims and the sink handed to profile providers
//! - [`users`] - Credential and profile providers
//! - [`provider`] - The engine driving the authorization code flow
//!
//! ## OAuth Flow
//!
//! 1. The client calls `/authorize`; the request is stored and the user agent
//!    is sent to the external login UI with the request id
//! 2. The login UI posts the credentials to `/api/login`
//! 3. `/authorize/callback` issues the code and redirects to the client
//! 4. The client exchanges the code (and the PKCE verifier) at `/oauth/token`
//! 5. The access token is used at `/userinfo`; the refresh token rotates at
//!    `/oauth/token`

pub mod client;
pub mod error;
pub mod pkce;
pub mod provider;
pub mod request;
pub mod userinfo;
pub mod users;

pub use client::{Client, ClientRegistry, GrantType};
pub use error::{ErrorKind, ErrorResponse, OidcError, OidcResult};
pub use pkce::{CodeChallenge, CodeChallengeMethod};
pub use provider::{
    AuthorizeParams, LoginParams, OidcProvider, OpenIdConfiguration, ProviderSettings,
    TokenParams, TokenResponse,
};
pub use request::{AuthRequest, NewAuthRequest, RequestState};
pub use userinfo::{UserInfoResponse, UserInfoSink};
pub use users::{StaticUserRepo, UserRepo, UserRepoError};
