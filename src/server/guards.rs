// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request guards

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

/// Raw bearer token from the `Authorization` header
///
/// The token is not verified here; the userinfo handler hands it to the
/// engine so that every failure gets the same `WWW-Authenticate` answer.
#[derive(Debug, Clone, PartialEq)]
pub struct BearerToken(pub String);

/// Why no bearer token could be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerError {
    Missing,
    Malformed,
}

impl BearerToken {
    /// Parse an `Authorization` header value; the scheme is case-insensitive
    pub fn parse(header: &str) -> Result<Self, BearerError> {
        let (scheme, token) = header
            .trim()
            .split_once(' ')
            .ok_or(BearerError::Malformed)?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(BearerError::Malformed);
        }
        Ok(Self(token.to_string()))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken {
    type Error = BearerError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.headers().get_one("Authorization") {
            None => Outcome::Error((Status::Unauthorized, BearerError::Missing)),
            Some(header) => match Self::parse(header) {
                Ok(token) => Outcome::Success(token),
                Err(e) => Outcome::Error((Status::Unauthorized, e)),
            },
        }
    }
}
