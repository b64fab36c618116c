// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OpenID Connect endpoint handlers
//!
//! Handlers only translate between HTTP and [`OidcProvider`]. Browser-facing
//! endpoints answer every non-internal failure with a redirect to the login
//! UI carrying a generic message; the token endpoint answers with OAuth JSON
//! errors.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use rocket::form::{Form, Lenient};
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{get, post, State};

use super::forms::{AuthorizeQuery, LoginForm, LogoutQuery, TokenForm};
use super::guards::{BearerError, BearerToken};
use super::responses::{NoStore, OAuthError};
use crate::auth::oauth2::provider::{redirect_url, LOGIN_ERROR_BAD_REQUEST};
use crate::auth::oauth2::{
    ErrorKind, LoginParams, OidcError, OidcProvider, TokenResponse, UserInfoResponse,
};

/// Deadline applied to the login and token handlers
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadline(pub Duration);

/// Redirect to the login UI for a browser-facing failure
fn browser_failure(
    provider: &OidcProvider,
    id: Option<&str>,
    err: OidcError,
) -> Result<Redirect, Status> {
    if err.kind() == ErrorKind::Internal {
        error!("Internal error: {}", err);
        return Err(Status::InternalServerError);
    }
    debug!("Browser request rejected: {}", err);
    Ok(Redirect::found(redirect_url(
        provider.login_url(),
        id,
        Some(LOGIN_ERROR_BAD_REQUEST),
    )))
}

/// OAuth 2.0 authorization endpoint
///
/// # URL
///
/// `GET /authorize`
///
/// # Returns
///
/// A redirect to the login UI of the client with the new request id
#[get("/authorize?<query..>")]
pub async fn authorize(
    query: AuthorizeQuery,
    provider: &State<Arc<OidcProvider>>,
) -> Result<Redirect, Status> {
    match provider.authorize(query.into()).await {
        Ok(location) => Ok(Redirect::found(location)),
        Err(e) => browser_failure(provider, None, e),
    }
}

/// Login form target of the external login UI
///
/// Always answers with a 302, except on internal failures or timeouts. A
/// body that is not a form is read as an empty form and so redirects with
/// the generic bad request message.
#[post("/api/login", data = "<form>")]
pub async fn login(
    form: Option<Form<Lenient<LoginForm>>>,
    provider: &State<Arc<OidcProvider>>,
    deadline: &State<RequestDeadline>,
) -> Result<Redirect, Status> {
    let params = match form {
        Some(form) => LoginParams::from(form.into_inner().into_inner()),
        None => {
            debug!("Login body is not a form");
            LoginParams::default()
        }
    };
    match tokio::time::timeout(deadline.0, provider.login(params)).await {
        Ok(Ok(location)) => Ok(Redirect::found(location)),
        Ok(Err(e)) => {
            error!("Login failed: {}", e);
            Err(Status::InternalServerError)
        }
        Err(_) => {
            warn!("Login handler timed out");
            Err(Status::ServiceUnavailable)
        }
    }
}

/// Issue the authorization code and return to the client
///
/// # URL
///
/// `GET /authorize/callback?id=…`
#[get("/authorize/callback?<id>")]
pub async fn authorize_callback(
    id: Option<String>,
    provider: &State<Arc<OidcProvider>>,
) -> Result<Redirect, Status> {
    let id = id.unwrap_or_default();
    match provider.callback(&id).await {
        Ok(location) => Ok(Redirect::found(location)),
        Err(e) => browser_failure(provider, Some(&id), e),
    }
}

/// OAuth 2.0 token endpoint
///
/// Accepts `application/x-www-form-urlencoded` and `application/json`
/// bodies for the `authorization_code` and `refresh_token` grants.
#[post("/oauth/token", data = "<form>")]
pub async fn token(
    form: Result<TokenForm, String>,
    provider: &State<Arc<OidcProvider>>,
    deadline: &State<RequestDeadline>,
) -> Result<NoStore<TokenResponse>, OAuthError> {
    let TokenForm(params) = form.map_err(|_| OAuthError::bad_request())?;
    match tokio::time::timeout(deadline.0, provider.token(params)).await {
        Ok(Ok(response)) => Ok(NoStore(Json(response))),
        Ok(Err(e)) => {
            if e.kind() == ErrorKind::Internal {
                error!("Token request failed: {}", e);
            } else {
                debug!("Token request rejected: {}", e);
            }
            Err(OAuthError::token(&e))
        }
        Err(_) => {
            warn!("Token handler timed out");
            Err(OAuthError::unavailable())
        }
    }
}

async fn userinfo_response(
    bearer: Result<BearerToken, BearerError>,
    provider: &OidcProvider,
) -> Result<Json<UserInfoResponse>, OAuthError> {
    let BearerToken(token) = bearer.map_err(|e| {
        debug!("Userinfo without usable bearer token: {:?}", e);
        OAuthError::invalid_bearer()
    })?;
    match provider.userinfo(&token).await {
        Ok(info) => Ok(Json(info)),
        Err(OidcError::Internal(cause)) => {
            error!("Userinfo failed: {}", cause);
            Err(OAuthError::token(&OidcError::Internal(cause)))
        }
        Err(e) => {
            debug!("Userinfo rejected: {}", e);
            Err(OAuthError::invalid_bearer())
        }
    }
}

/// OpenID Connect userinfo endpoint
#[get("/userinfo")]
pub async fn userinfo(
    bearer: Result<BearerToken, BearerError>,
    provider: &State<Arc<OidcProvider>>,
) -> Result<Json<UserInfoResponse>, OAuthError> {
    userinfo_response(bearer, provider).await
}

/// OpenID Connect userinfo endpoint, POST variant
#[post("/userinfo")]
pub async fn userinfo_post(
    bearer: Result<BearerToken, BearerError>,
    provider: &State<Arc<OidcProvider>>,
) -> Result<Json<UserInfoResponse>, OAuthError> {
    userinfo_response(bearer, provider).await
}

/// End session: 307 to `returnTo`
#[get("/api/logout?<query..>")]
pub fn logout(query: LogoutQuery, provider: &State<Arc<OidcProvider>>) -> Redirect {
    Redirect::temporary(provider.end_session(query.return_to))
}

/// Auth0-compatible alias of [`logout`]
#[get("/v2/logout?<query..>")]
pub fn logout_v2(query: LogoutQuery, provider: &State<Arc<OidcProvider>>) -> Redirect {
    Redirect::temporary(provider.end_session(query.return_to))
}
