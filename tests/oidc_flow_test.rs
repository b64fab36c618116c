// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end authorization code flow with PKCE against the Rocket surface

mod common;

use common::*;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use rust_oidc_provider::auth::oauth2::{AuthRequest, NewAuthRequest};
use rust_oidc_provider::storage::RequestRepo;
use serde_json::Value;

/// Verify a token with the published JWK set and return its claims
async fn verify_with_jwks(client: &Client, token: &str) -> Value {
    let response = client.get("/jwks.json").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let jwks: JwkSet = response.into_json().await.expect("JWK set");
    assert_eq!(jwks.keys.len(), 1);

    let header = decode_header(token).expect("JWT header");
    assert_eq!(header.alg, Algorithm::RS256);
    let kid = header.kid.expect("kid");
    let jwk = jwks.find(&kid).expect("kid of the signing key");

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_aud = false;
    decode::<Value>(token, &DecodingKey::from_jwk(jwk).unwrap(), &validation)
        .expect("token verifies with the JWK set")
        .claims
}

#[rocket::async_test]
async fn test_happy_path() {
    let client = test_client().await;
    let (verifier, challenge) = pkce_pair();

    // Step 1: authorize
    let uri = format!(
        "/authorize?response_type=code&client_id=default-client&redirect_uri={}&scope=openid%20email%20profile&state=hogestate&code_challenge={}&code_challenge_method=S256",
        urlencode(WEB_URL),
        challenge
    );
    let response = client.get(uri).dispatch().await;
    assert_eq!(response.status(), Status::Found);
    let login_page = location(&response);
    assert!(login_page.starts_with("https://web.example.com/login?id="));
    let id = query_map(&login_page)["id"].clone();

    // Step 2: login
    let next = post_login(&client, "aaa@example.com", "aaa", &id).await;
    assert_eq!(
        next,
        format!("https://example.com/authorize/callback?id={id}")
    );

    // Step 3: callback
    let response = client
        .get(format!("/authorize/callback?id={id}"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Found);
    let redirect = location(&response);
    let params = query_map(&redirect);
    let code = params["code"].clone();
    assert_eq!(
        redirect,
        format!("https://web.example.com?code={code}&state=hogestate")
    );

    // Step 4: token
    let (status, body) = exchange_code(&client, &code, &verifier).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["state"], "hogestate");
    assert!(body["expires_in"].as_i64().unwrap() > 0);
    for key in ["id_token", "access_token", "refresh_token"] {
        assert!(body[key].as_str().is_some_and(|t| !t.is_empty()), "{key}");
    }

    // Step 5: userinfo
    let access_token = body["access_token"].as_str().unwrap();
    let response = client
        .get("/userinfo")
        .header(Header::new(
            "Authorization",
            format!("Bearer {access_token}"),
        ))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let info: Value = response.into_json().await.unwrap();
    assert_eq!(
        info,
        serde_json::json!({
            "sub": "subsub",
            "email": "aaa@example.com",
            "name": "aaa",
            "email_verified": true
        })
    );
}

#[rocket::async_test]
async fn test_tokens_verify_with_jwks() {
    let client = test_client().await;
    let (code, verifier) = authorization_code(&client).await;
    let (status, body) = exchange_code(&client, &code, &verifier).await;
    assert_eq!(status, Status::Ok);

    let access = verify_with_jwks(&client, body["access_token"].as_str().unwrap()).await;
    assert_eq!(access["sub"], "subsub");
    assert_eq!(access["client_id"], CLIENT_ID);
    assert_eq!(access["aud"], serde_json::json!(["example.com"]));
    assert_eq!(access["nbf"], access["iat"]);
    assert_eq!(
        access["exp"].as_i64().unwrap() - access["iat"].as_i64().unwrap(),
        300
    );
    let scope = access["scope"].as_str().unwrap();
    for essential in ["openid", "profile", "email", "offline_access"] {
        assert!(scope.split(' ').any(|s| s == essential), "{essential}");
    }

    let id_token = verify_with_jwks(&client, body["id_token"].as_str().unwrap()).await;
    assert_eq!(id_token["aud"], serde_json::json!([CLIENT_ID]));
    assert_eq!(id_token["nonce"], "n0nce");
    assert_eq!(id_token["amr"], serde_json::json!(["pwd"]));
    assert_eq!(id_token["email"], "aaa@example.com");
    assert_eq!(
        id_token["at_hash"],
        rust_oidc_provider::auth::jwt::at_hash(body["access_token"].as_str().unwrap())
    );
}

#[rocket::async_test]
async fn test_wrong_password() {
    let client = test_client().await;
    let (_, challenge) = pkce_pair();
    let id = start_authorization(&client, &challenge).await;

    let next = post_login(&client, "aaa@example.com", "aaa_", &id).await;
    assert_eq!(
        next,
        format!(
            "https://web.example.com/login?error=Login+failed%3B+Invalid+s+ID+or+password.&id={id}"
        )
    );
}

#[rocket::async_test]
async fn test_login_errors_are_opaque() {
    let client = test_client().await;
    let (_, challenge) = pkce_pair();
    let id = start_authorization(&client, &challenge).await;

    let unknown_user = post_login(&client, "nobody@example.com", "aaa", &id).await;
    let wrong_password = post_login(&client, "aaa@example.com", "nope", &id).await;
    let empty_field = post_login(&client, "aaa@example.com", "", &id).await;
    let unknown_request = post_login(&client, "aaa@example.com", "aaa", "not-a-request").await;

    assert_eq!(unknown_user, wrong_password);

    let allowed = [
        "Invalid request.",
        "Please enter your ID and password.",
        "Login failed; Invalid s ID or password.",
    ];
    for (location, expected_id) in [
        (&unknown_user, id.as_str()),
        (&wrong_password, id.as_str()),
        (&empty_field, id.as_str()),
        (&unknown_request, "not-a-request"),
    ] {
        assert!(location.starts_with("https://web.example.com/login?"));
        let params = query_map(location);
        assert_eq!(params.len(), 2, "{location}");
        assert_eq!(params["id"], expected_id);
        assert!(allowed.contains(&params["error"].as_str()), "{location}");
    }
    assert_eq!(
        query_map(&empty_field)["error"],
        "Please enter your ID and password."
    );
    assert_eq!(query_map(&unknown_request)["error"], "Invalid request.");

    // The request is still usable after failed attempts
    let next = post_login(&client, "aaa@example.com", "aaa", &id).await;
    assert!(next.starts_with("https://example.com/authorize/callback?id="));
}

#[rocket::async_test]
async fn test_refresh_rotation() {
    let client = test_client().await;
    let (code, verifier) = authorization_code(&client).await;
    let (_, first) = exchange_code(&client, &code, &verifier).await;
    let first_refresh = verify_with_jwks(&client, first["refresh_token"].as_str().unwrap()).await;

    let (status, second) = post_token(
        &client,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", first["refresh_token"].as_str().unwrap()),
        ],
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert!(second.get("state").is_none());
    assert_eq!(second["token_type"], "Bearer");
    // expires_in is lifetime minus clock skew, identical on every response
    for key in ["id_token", "access_token", "refresh_token"] {
        assert_ne!(first[key], second[key], "{key}");
    }

    let second_refresh =
        verify_with_jwks(&client, second["refresh_token"].as_str().unwrap()).await;
    for claim in ["auth_id", "sub", "scope", "client_id", "auth_time", "amr"] {
        assert_eq!(first_refresh[claim], second_refresh[claim], "{claim}");
    }
    assert_ne!(first_refresh["jti"], second_refresh["jti"]);

    // The rotated token keeps working
    let (status, _) = post_token(
        &client,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", second["refresh_token"].as_str().unwrap()),
        ],
    )
    .await;
    assert_eq!(status, Status::Ok);
}

#[rocket::async_test]
async fn test_invalid_refresh_token() {
    let client = test_client().await;
    let (status, body) = post_token(
        &client,
        &[("grant_type", "refresh_token"), ("refresh_token", "garbage")],
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "invalid_grant");

    let (status, body) = post_token(&client, &[("grant_type", "refresh_token")]).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "invalid_request");
}

#[rocket::async_test]
async fn test_discovery_overrides() {
    let client = test_client().await;
    let response = client
        .get("/.well-known/openid-configuration")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::JSON));
    let body = response.into_string().await.unwrap();
    assert!(body.contains(r#""jwks_uri":"https://example.com/jwks.json""#));

    let document: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(document["issuer"], ISSUER);
    assert_eq!(
        document["end_session_endpoint"],
        "https://example.com/api/logout"
    );
    assert_eq!(document["token_endpoint"], "https://example.com/oauth/token");
    assert_eq!(
        document["id_token_signing_alg_values_supported"],
        serde_json::json!(["RS256"])
    );
}

#[rocket::async_test]
async fn test_login_without_form_body_redirects() {
    let client = test_client().await;

    for content_type in [Some(ContentType::JSON), None] {
        let mut request = client
            .post("/api/login")
            .body(r#"{"username":"aaa@example.com","password":"aaa"}"#);
        if let Some(content_type) = content_type {
            request = request.header(content_type);
        }
        let response = request.dispatch().await;
        assert_eq!(response.status(), Status::Found);
        let location = location(&response);
        assert!(location.starts_with("https://web.example.com/login?"));
        assert_eq!(query_map(&location)["error"], "Invalid request.");
    }
}

#[rocket::async_test]
async fn test_abandoned_requests_are_purged() {
    let (client, store) = client_with_store(test_config()).await;
    let abandoned = AuthRequest::new(
        NewAuthRequest {
            client_id: CLIENT_ID.to_string(),
            state: String::new(),
            nonce: None,
            redirect_uri: WEB_URL.to_string(),
            response_type: "code".to_string(),
            scopes: vec!["openid".to_string()],
            audiences: vec![],
            code_challenge: None,
        },
        chrono::Utc::now() - chrono::Duration::days(3),
    );
    store.save(&abandoned).await.unwrap();

    let (_, challenge) = pkce_pair();
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(start_authorization(&client, &challenge).await);
    }

    assert!(store.find_by_id(&abandoned.id).await.is_err());
    assert_eq!(store.len().await, ids.len());
    for id in &ids {
        assert!(store.find_by_id(id).await.is_ok());
    }
}

#[rocket::async_test]
async fn test_code_replay() {
    let (client, store) = client_with_store(test_config()).await;
    let (verifier, challenge) = pkce_pair();
    let id = start_authorization(&client, &challenge).await;
    post_login(&client, "aaa@example.com", "aaa", &id).await;
    let code = callback(&client, &id).await;

    let (status, _) = exchange_code(&client, &code, &verifier).await;
    assert_eq!(status, Status::Ok);

    let (status, body) = exchange_code(&client, &code, &verifier).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "invalid_grant");
    assert!(store.find_by_id(&id).await.is_err());
    assert!(store.is_empty().await);
}

#[rocket::async_test]
async fn test_pkce_mismatch_is_rejected() {
    let client = test_client().await;
    let (code, verifier) = authorization_code(&client).await;

    let (status, body) = exchange_code(&client, &code, "wrong-verifier").await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "invalid_grant");
    assert_eq!(
        body["error_description"],
        "The provided authorization grant is invalid."
    );

    // A failed attempt does not consume the code
    let (status, _) = exchange_code(&client, &code, &verifier).await;
    assert_eq!(status, Status::Ok);
}

#[rocket::async_test]
async fn test_redirect_uri_must_match_exactly() {
    let client = test_client().await;
    let (code, verifier) = authorization_code(&client).await;

    let (status, body) = post_token(
        &client,
        &[
            ("grant_type", "authorization_code"),
            ("redirect_uri", "https://web.example.com/"),
            ("client_id", CLIENT_ID),
            ("code", &code),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "invalid_grant");
}

#[rocket::async_test]
async fn test_token_json_body() {
    let client = test_client().await;
    let (code, verifier) = authorization_code(&client).await;

    let body = serde_json::json!({
        "grant_type": "authorization_code",
        "redirect_uri": WEB_URL,
        "client_id": CLIENT_ID,
        "code": code,
        "code_verifier": verifier,
    });
    let response = client
        .post("/oauth/token")
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(
        response.headers().get_one("Cache-Control"),
        Some("no-store")
    );
    let tokens: Value = response.into_json().await.unwrap();
    assert_eq!(tokens["state"], "hogestate");

    for bad in ["", "not json"] {
        let response = client
            .post("/oauth/token")
            .header(ContentType::JSON)
            .body(bad)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let error: Value = response.into_json().await.unwrap();
        assert_eq!(error["error"], "invalid_request");
    }
}

#[rocket::async_test]
async fn test_unsupported_grant_type() {
    let client = test_client().await;
    let (status, body) = post_token(&client, &[("grant_type", "password")]).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "unsupported_grant_type");
}

#[rocket::async_test]
async fn test_authorize_rejections_redirect_to_login() {
    let client = test_client().await;
    let (_, challenge) = pkce_pair();
    let cases = [
        // unknown client
        format!(
            "/authorize?response_type=code&client_id=other&redirect_uri={}&scope=openid&code_challenge={challenge}&code_challenge_method=S256",
            urlencode(WEB_URL)
        ),
        // unregistered redirect URI
        format!(
            "/authorize?response_type=code&client_id=default-client&redirect_uri={}&scope=openid&code_challenge={challenge}&code_challenge_method=S256",
            urlencode("https://evil.example.com")
        ),
        // implicit flow
        format!(
            "/authorize?response_type=token&client_id=default-client&redirect_uri={}&scope=openid&code_challenge={challenge}&code_challenge_method=S256",
            urlencode(WEB_URL)
        ),
        // scope outside the client policy
        format!(
            "/authorize?response_type=code&client_id=default-client&redirect_uri={}&scope=openid%20admin&code_challenge={challenge}&code_challenge_method=S256",
            urlencode(WEB_URL)
        ),
        // public client without PKCE
        format!(
            "/authorize?response_type=code&client_id=default-client&redirect_uri={}&scope=openid",
            urlencode(WEB_URL)
        ),
    ];
    for uri in cases {
        let response = client.get(uri.clone()).dispatch().await;
        assert_eq!(response.status(), Status::Found, "{uri}");
        assert_eq!(
            location(&response),
            "https://web.example.com/login?error=Invalid+request.",
            "{uri}"
        );
    }
}

#[rocket::async_test]
async fn test_callback_requires_login() {
    let client = test_client().await;
    let (_, challenge) = pkce_pair();
    let id = start_authorization(&client, &challenge).await;

    let response = client
        .get(format!("/authorize/callback?id={id}"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Found);
    assert_eq!(
        location(&response),
        format!("https://web.example.com/login?error=Invalid+request.&id={id}")
    );
}

#[rocket::async_test]
async fn test_userinfo_requires_valid_bearer() {
    let client = test_client().await;

    let response = client.get("/userinfo").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(
        response.headers().get_one("WWW-Authenticate"),
        Some("Bearer error=\"invalid_token\"")
    );

    let response = client
        .get("/userinfo")
        .header(Header::new("Authorization", "Bearer not.a.token"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
    let error: Value = response.into_json().await.unwrap();
    assert_eq!(error["error"], "invalid_token");
}

#[rocket::async_test]
async fn test_logout_redirects() {
    let client = test_client().await;

    for path in ["/api/logout", "/v2/logout"] {
        let response = client
            .get(format!(
                "{path}?returnTo={}",
                urlencode("https://web.example.com/bye")
            ))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::TemporaryRedirect);
        assert_eq!(location(&response), "https://web.example.com/bye");
    }

    let response = client.get("/api/logout").dispatch().await;
    assert_eq!(response.status(), Status::TemporaryRedirect);
    assert_eq!(location(&response), WEB_URL);
}
