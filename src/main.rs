// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point of the OpenID provider
use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use rust_oidc_provider::config::{self, Config};
use rust_oidc_provider::server;

/// Embedded OpenID Connect authorization server
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Web server port
    #[arg(short = 'p', long, env = "OIDC_PORT")]
    port: Option<u16>,

    /// Web server address
    #[arg(short = 'a', long, env = "OIDC_ADDRESS")]
    address: Option<String>,

    /// Issuer URL
    #[arg(long, env = "OIDC_ISSUER")]
    issuer: Option<String>,

    /// Base URL of the external login UI
    #[arg(long, env = "OIDC_WEB_URL")]
    web_url: Option<String>,

    /// Secret used to derive authorization codes
    #[arg(long, env = "OIDC_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Force development mode
    #[arg(long)]
    dev: bool,

    /// Refuse plain HTTP issuers
    #[arg(long)]
    deny_http: bool,

    /// Directory holding the persisted signing key
    #[arg(long, env = "OIDC_DATA_DIR")]
    data_dir: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(long, env = "OIDC_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[rocket::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.port,
        args.address.clone(),
        args.issuer.clone(),
        args.web_url.clone(),
        args.key.clone(),
        args.dev,
        args.deny_http,
        args.data_dir.clone(),
    );
    // Overrides must satisfy the same rules as the file
    config::utils::validate_specific_rules(&config)?;

    info!(
        "Starting OpenID provider for {} on {}:{}",
        config.oidc.issuer(),
        config.server.address,
        config.server.port
    );

    let figment = server::build_figment(&config)?;
    let rocket = server::build_rocket(figment, &config).await?;
    rocket.launch().await?;

    info!("Server stopped");
    Ok(())
}
