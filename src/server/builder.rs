// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket server builder and configuration
//!
//! This module wires the engine from the configuration and builds the Rocket
//! instance with all routes and managed state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use log::{debug, info};
use rocket::config::LogLevel;
use rocket::data::{Limits, ToByteUnit};
use rocket::figment::Figment;
use rocket::{routes, Build, Rocket};

use super::handlers::*;
use super::oidc::{jwks, openid_configuration};
use crate::auth::jwt::{KeyMaterial, TokenIssuer};
use crate::auth::oauth2::{
    ClientRegistry, OidcProvider, ProviderSettings, StaticUserRepo, UserRepo,
};
use crate::config::Config;
use crate::storage::{ConfigRepo, FileConfigRepo, MemoryConfigRepo, MemoryRequestRepo, RequestRepo};

/// Build the Rocket figment from the server configuration
///
/// TLS is enabled when both a certificate and a key are configured.
pub fn build_figment(config: &Config) -> Result<Figment> {
    let mut figment = rocket::Config::figment()
        .merge((
            "ident",
            format!("rust-oidc-provider/{}", env!("CARGO_PKG_VERSION")),
        ))
        .merge(("limits", Limits::new().limit("form", 64.kibibytes())))
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port))
        .merge(("log_level", LogLevel::Normal));

    if let (Some(cert), Some(key)) = (&config.server.cert, &config.server.key) {
        debug!("SSL certificates found in configuration, enabling TLS");
        let cert_data = BASE64_STANDARD
            .decode(cert)
            .context("Failed to decode the TLS certificate")?;
        let key_data = BASE64_STANDARD
            .decode(key)
            .context("Failed to decode the TLS key")?;
        figment = figment
            .merge(("tls.certs", cert_data))
            .merge(("tls.key", key_data));
        info!("TLS enabled for web server");
    }

    Ok(figment)
}

/// Persistent store of the signing key material
///
/// Without a data directory the key lives in memory and changes on every
/// restart.
pub fn config_repo(config: &Config) -> Box<dyn ConfigRepo> {
    let lock_timeout = Duration::from_secs(config.storage.lock_timeout_secs);
    match &config.storage.data_dir {
        Some(dir) => Box::new(FileConfigRepo::new(dir, lock_timeout)),
        None => {
            info!("No data directory configured, the signing key will not survive restarts");
            Box::new(MemoryConfigRepo::new())
        }
    }
}

/// Wire the engine from its stores
///
/// Loads or generates the key material under the config lock, then builds
/// the client registry. Any failure here is fatal for the server.
pub async fn init_provider_with(
    config: &Config,
    config_repo: &dyn ConfigRepo,
    requests: Arc<dyn RequestRepo>,
    users: Arc<dyn UserRepo>,
) -> Result<OidcProvider> {
    let keys = KeyMaterial::init(config_repo, &config.oidc.dn)
        .await
        .context("Failed to initialize the signing key material")?;
    let clients =
        ClientRegistry::from_config(&config.oidc).context("Failed to register the clients")?;
    let tokens = TokenIssuer::new(
        Arc::new(keys),
        config.oidc.issuer(),
        config.oidc.clock_skew_secs,
    );
    info!("OpenID provider ready for issuer {}", config.oidc.issuer());
    Ok(OidcProvider::new(
        ProviderSettings::from_config(&config.oidc),
        clients,
        requests,
        users,
        tokens,
    ))
}

/// Wire the engine with the default stores
///
/// Requests are kept in memory and users come from the `access` section.
pub async fn init_provider(config: &Config) -> Result<OidcProvider> {
    let repo = config_repo(config);
    init_provider_with(
        config,
        repo.as_ref(),
        Arc::new(MemoryRequestRepo::new()),
        Arc::new(StaticUserRepo::new(config.access.clone())),
    )
    .await
}

/// Build a configured Rocket server instance around an engine
///
/// Routes are mounted under the path of the public URL.
pub fn build_rocket_with_provider(
    figment: Figment,
    config: &Config,
    provider: Arc<OidcProvider>,
) -> Rocket<Build> {
    let mount_path = config.oidc.mount_path();
    debug!("Mounting OpenID endpoints at {}", mount_path);
    rocket::custom(figment)
        .mount(
            mount_path.as_str(),
            routes![
                authorize,
                authorize_callback,
                login,
                token,
                userinfo,
                userinfo_post,
                logout,
                logout_v2,
                openid_configuration,
                jwks,
            ],
        )
        .manage(provider)
        .manage(RequestDeadline(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
}

/// Build a configured Rocket server instance
///
/// ### Errors
///
/// Fails when the key material cannot be loaded or generated, or when the
/// client registry rejects the configuration.
///
/// ### Example
///
/// ```no_run
/// use rust_oidc_provider::config::Config;
/// use rust_oidc_provider::server;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::default();
/// let figment = server::build_figment(&config)?;
/// let rocket = server::build_rocket(figment, &config).await?;
/// // rocket.launch().await?;
/// # Ok(())
/// # }
/// ```
pub async fn build_rocket(figment: Figment, config: &Config) -> Result<Rocket<Build>> {
    let provider = init_provider(config).await?;
    Ok(build_rocket_with_provider(
        figment,
        config,
        Arc::new(provider),
    ))
}
