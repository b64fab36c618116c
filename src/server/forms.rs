// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Form data structures of the HTTP surface
//!
//! Query and form structures are converted into the framework-independent
//! parameter types of [`crate::auth::oauth2::provider`].

use log::debug;
use rocket::data::{self, Data, FromData, ToByteUnit};
use rocket::form::FromForm;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::Request;
use serde_json::{Map, Value};

use crate::auth::oauth2::{AuthorizeParams, LoginParams, TokenParams};

/// Query parameters of `GET /authorize`
#[derive(FromForm, Debug, Clone, Default)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

impl From<AuthorizeQuery> for AuthorizeParams {
    fn from(query: AuthorizeQuery) -> Self {
        Self {
            response_type: query.response_type,
            client_id: query.client_id,
            redirect_uri: query.redirect_uri,
            scope: query.scope,
            state: query.state,
            nonce: query.nonce,
            code_challenge: query.code_challenge,
            code_challenge_method: query.code_challenge_method,
        }
    }
}

/// Credentials posted by the login UI
#[derive(FromForm, Debug, Clone, Default)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub id: Option<String>,
}

impl From<LoginForm> for LoginParams {
    fn from(form: LoginForm) -> Self {
        Self {
            username: form.username,
            password: form.password,
            id: form.id,
        }
    }
}

/// Query parameters of the logout endpoints
#[derive(FromForm, Debug, Clone, Default)]
pub struct LogoutQuery {
    #[field(name = "returnTo")]
    pub return_to: Option<String>,
}

/// Body of `POST /oauth/token`
///
/// Form-encoded bodies are read as is. A JSON body is accepted as a flat
/// object whose scalar values are coerced to strings; an empty or non-JSON
/// body with a JSON content type is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenForm(pub TokenParams);

/// Flatten a JSON object into token parameters
pub fn token_params_from_json(body: &str) -> Result<TokenParams, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| format!("invalid JSON body: {e}"))?;
    let Value::Object(object) = value else {
        return Err("JSON body must be an object".to_string());
    };

    let mut fields = Map::new();
    for (key, value) in object {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(format!("field {key} must be a scalar"));
            }
        };
        fields.insert(key, Value::String(value));
    }
    serde_json::from_value(Value::Object(fields)).map_err(|e| e.to_string())
}

/// Parse a form-encoded token request
pub fn token_params_from_form(body: &str) -> Result<TokenParams, String> {
    serde_urlencoded::from_str(body).map_err(|e| format!("invalid form body: {e}"))
}

#[rocket::async_trait]
impl<'r> FromData<'r> for TokenForm {
    type Error = String;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        let limit = req.limits().get("form").unwrap_or_else(|| 32.kibibytes());
        let body = match data.open(limit).into_string().await {
            Ok(body) if body.is_complete() => body.into_inner(),
            Ok(_) => {
                return Outcome::Error((Status::PayloadTooLarge, "body too large".to_string()))
            }
            Err(e) => return Outcome::Error((Status::BadRequest, e.to_string())),
        };

        let is_json = req.content_type().is_some_and(|ct| ct.is_json());
        let parsed = if is_json {
            token_params_from_json(&body)
        } else {
            token_params_from_form(&body)
        };

        match parsed {
            Ok(params) => Outcome::Success(TokenForm(params)),
            Err(e) => {
                debug!("Rejected token request body: {}", e);
                Outcome::Error((Status::BadRequest, e))
            }
        }
    }
}
