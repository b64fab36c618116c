// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Responders for token and userinfo answers

use rocket::http::{Header, Status};
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use serde::Serialize;

use crate::auth::oauth2::{ErrorResponse, OidcError};

/// JSON body that must not be cached (RFC 6749 section 5.1)
pub struct NoStore<T>(pub Json<T>);

impl<'r, T: Serialize> Responder<'r, 'static> for NoStore<T> {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        Response::build_from(self.0.respond_to(req)?)
            .header(Header::new("Cache-Control", "no-store"))
            .header(Header::new("Pragma", "no-cache"))
            .ok()
    }
}

/// OAuth 2.0 JSON error with its status code
#[derive(Debug)]
pub struct OAuthError {
    pub status: Status,
    pub body: ErrorResponse,
    /// Value of the `WWW-Authenticate` header, if any
    pub challenge: Option<String>,
}

impl OAuthError {
    /// Token endpoint error
    pub fn token(error: &OidcError) -> Self {
        let challenge = match error {
            OidcError::InvalidClient(_) => Some("Basic".to_string()),
            _ => None,
        };
        Self {
            status: Status::from_code(error.http_status()).unwrap_or(Status::BadRequest),
            body: error.to_error_response(),
            challenge,
        }
    }

    /// Protected resource error: every failure is an invalid bearer token
    pub fn invalid_bearer() -> Self {
        let error = OidcError::InvalidToken;
        Self {
            status: Status::Unauthorized,
            body: error.to_error_response(),
            challenge: Some(format!("Bearer error=\"{}\"", error.error_code())),
        }
    }

    /// The request could not be served before its deadline
    pub fn unavailable() -> Self {
        Self {
            status: Status::ServiceUnavailable,
            body: ErrorResponse {
                error: "temporarily_unavailable".to_string(),
                error_description: Some("The request timed out.".to_string()),
            },
            challenge: None,
        }
    }

    /// Malformed request body
    pub fn bad_request() -> Self {
        Self::token(&OidcError::InvalidRequest("malformed body".to_string()))
    }
}

impl<'r> Responder<'r, 'static> for OAuthError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let mut response = Response::build_from(NoStore(Json(self.body)).respond_to(req)?);
        response.status(self.status);
        if let Some(challenge) = self.challenge {
            response.header(Header::new("WWW-Authenticate", challenge));
        }
        response.ok()
    }
}
