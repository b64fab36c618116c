// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OIDC protocol error types
//!
//! Every engine operation fails with an [`OidcError`]. The HTTP layer maps
//! it to a redirect (login), an OAuth JSON error (token) or a bearer
//! challenge (userinfo) from its [`ErrorKind`] and OAuth error code. The
//! message carried by a variant is only ever logged: responses use
//! [`OidcError::public_description`], which does not depend on which check
//! failed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;

/// Coarse classification used at the user-visible boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InvalidCredentials,
    InvalidToken,
    Internal,
}

/// OIDC protocol errors
#[derive(Debug, Error)]
pub enum OidcError {
    /// Entity absent from a store or registry
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request parameters
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Unknown client or client mismatch
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Invalid, expired or consumed authorization grant
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// Scope not allowed for the client
    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    /// Credential provider rejected the login
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Access or refresh token failed verification
    #[error("invalid_token")]
    InvalidToken,

    /// Storage, signing or unexpected state failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for engine operations
pub type OidcResult<T> = Result<T, OidcError>;

impl OidcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidRequest(_)
            | Self::InvalidClient(_)
            | Self::InvalidGrant(_)
            | Self::InvalidScope(_)
            | Self::UnsupportedGrantType(_)
            | Self::UnsupportedResponseType(_) => ErrorKind::InvalidInput,
            Self::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            Self::InvalidToken => ErrorKind::InvalidToken,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) | Self::InvalidCredentials(_) => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidToken => "invalid_token",
            Self::Internal(_) => "server_error",
        }
    }

    /// Returns the HTTP status code for this error at the token endpoint
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient(_) | Self::InvalidToken => 401,
            Self::Internal(_) => 500,
            _ => 400,
        }
    }

    /// Description safe to return to the caller
    pub const fn public_description(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::InvalidRequest(_) => "The request is invalid.",
            Self::InvalidClient(_) => "Client authentication failed.",
            Self::InvalidGrant(_) | Self::InvalidCredentials(_) => {
                "The provided authorization grant is invalid."
            }
            Self::InvalidScope(_) => "The requested scope is invalid.",
            Self::UnsupportedGrantType(_) => "The grant type is not supported.",
            Self::UnsupportedResponseType(_) => "The response type is not supported.",
            Self::InvalidToken => "The token is invalid.",
            Self::Internal(_) => "The server encountered an unexpected error.",
        }
    }

    /// Creates the JSON body of an OAuth error response
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.public_description().to_string()),
        }
    }
}

impl From<StorageError> for OidcError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound("storage".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for OidcError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Internal(format!("token signing failed: {err}"))
    }
}

/// OAuth 2.0 error response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}
