// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared fixtures of the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use base64::Engine;
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use rust_oidc_provider::auth::oauth2::StaticUserRepo;
use rust_oidc_provider::config::{AccessConfig, Config, DistinguishedNameConfig, User};
use rust_oidc_provider::server;
use rust_oidc_provider::storage::{MemoryConfigRepo, MemoryRequestRepo};
use rust_oidc_provider::utility::{generate_signing_material, SigningMaterial};
use sha2::{Digest, Sha256};
use url::Url;

/// `openssl passwd -5 -salt abcdefgh aaa | base64 -w0`
pub const AAA_PASSWORD_HASH: &str =
    "JDUkYWJjZGVmZ2gkLzlyZnVTcVNmbkczcVQ4SmJjSnpsckQzR2dzNE5QNGtpcG9DSEFWLmMwMAo=";

pub const ISSUER: &str = "https://example.com/";
pub const WEB_URL: &str = "https://web.example.com";
pub const CLIENT_ID: &str = "default-client";

/// Key material shared by every test of a binary; RSA generation is slow
pub fn signing_material() -> SigningMaterial {
    static MATERIAL: OnceLock<SigningMaterial> = OnceLock::new();
    MATERIAL
        .get_or_init(|| {
            generate_signing_material(&DistinguishedNameConfig::default(), 30)
                .expect("Failed to generate signing material")
        })
        .clone()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.oidc.issuer = ISSUER.to_string();
    config.oidc.web_url = WEB_URL.to_string();
    config.storage.data_dir = None;
    config.access = AccessConfig {
        users: vec![User {
            email: "aaa@example.com".to_string(),
            pass: AAA_PASSWORD_HASH.to_string(),
            subject: "subsub".to_string(),
            name: Some("aaa".to_string()),
            email_verified: true,
        }],
    };
    config
}

/// Generate a test configuration for Rocket
pub fn get_test_figment() -> rocket::figment::Figment {
    rocket::Config::figment()
        .merge(("port", 0))
        .merge(("address", "127.0.0.1"))
        .merge(("log_level", rocket::config::LogLevel::Off))
}

/// Client over a fresh engine; the request store is returned for inspection
pub async fn client_with_store(config: Config) -> (Client, MemoryRequestRepo) {
    let _ = env_logger::builder().is_test(true).try_init();

    let repo = MemoryConfigRepo::with_material(signing_material());
    let requests = MemoryRequestRepo::new();
    let provider = server::init_provider_with(
        &config,
        &repo,
        Arc::new(requests.clone()),
        Arc::new(StaticUserRepo::new(config.access.clone())),
    )
    .await
    .expect("Failed to initialize the provider");

    let rocket =
        server::build_rocket_with_provider(get_test_figment(), &config, Arc::new(provider));
    let client = Client::tracked(rocket)
        .await
        .expect("valid rocket instance");
    (client, requests)
}

pub async fn client_with(config: Config) -> Client {
    client_with_store(config).await.0
}

pub async fn test_client() -> Client {
    client_with(test_config()).await
}

/// PKCE verifier and its S256 challenge
pub fn pkce_pair() -> (String, String) {
    let verifier: String = rand::random::<[u8; 32]>()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

pub fn query_map(location: &str) -> HashMap<String, String> {
    Url::parse(location)
        .expect("valid location")
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

pub fn location(response: &rocket::local::asynchronous::LocalResponse<'_>) -> String {
    response
        .headers()
        .get_one("Location")
        .expect("Location header")
        .to_string()
}

/// `GET /authorize`, returns the request id from the login UI redirect
pub async fn start_authorization(client: &Client, challenge: &str) -> String {
    let uri = format!(
        "/authorize?response_type=code&client_id={}&redirect_uri={}&scope=openid%20offline_access&state=hogestate&nonce=n0nce&code_challenge={}&code_challenge_method=S256",
        CLIENT_ID,
        urlencode(WEB_URL),
        challenge
    );
    let response = client.get(uri).dispatch().await;
    assert_eq!(response.status(), Status::Found);
    let location = location(&response);
    assert!(
        location.starts_with("https://web.example.com/login?id="),
        "unexpected login redirect {location}"
    );
    query_map(&location)["id"].clone()
}

pub async fn post_login(client: &Client, username: &str, password: &str, id: &str) -> String {
    let body = serde_urlencoded::to_string([
        ("username", username),
        ("password", password),
        ("id", id),
    ])
    .expect("form body");
    let response = client
        .post("/api/login")
        .header(ContentType::Form)
        .body(body)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Found);
    location(&response)
}

/// `GET /authorize/callback`, returns the authorization code
pub async fn callback(client: &Client, id: &str) -> String {
    let response = client
        .get(format!("/authorize/callback?id={id}"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Found);
    let location = location(&response);
    assert!(location.starts_with("https://web.example.com?code="));
    query_map(&location)["code"].clone()
}

/// Run authorize, login and callback; returns the code and the verifier
pub async fn authorization_code(client: &Client) -> (String, String) {
    let (verifier, challenge) = pkce_pair();
    let id = start_authorization(client, &challenge).await;
    post_login(client, "aaa@example.com", "aaa", &id).await;
    (callback(client, &id).await, verifier)
}

pub async fn post_token(
    client: &Client,
    fields: &[(&str, &str)],
) -> (Status, serde_json::Value) {
    let response = client
        .post("/oauth/token")
        .header(ContentType::Form)
        .body(serde_urlencoded::to_string(fields).expect("form body"))
        .dispatch()
        .await;
    let status = response.status();
    let body = response.into_string().await.unwrap_or_default();
    (
        status,
        serde_json::from_str(&body).unwrap_or(serde_json::Value::Null),
    )
}

pub async fn exchange_code(client: &Client, code: &str, verifier: &str) -> (Status, serde_json::Value) {
    post_token(
        client,
        &[
            ("grant_type", "authorization_code"),
            ("redirect_uri", WEB_URL),
            ("client_id", CLIENT_ID),
            ("code", code),
            ("code_verifier", verifier),
        ],
    )
    .await
}

/// Claims of a JWT, without verifying its signature
pub fn unverified_claims(token: &str) -> serde_json::Value {
    let payload = token.split('.').nth(1).expect("JWT payload");
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .expect("base64url payload");
    serde_json::from_slice(&bytes).expect("JSON claims")
}

pub fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
