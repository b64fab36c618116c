// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Credential and profile provider
//!
//! The engine never sees passwords or user records directly: it asks a
//! [`UserRepo`] to turn credentials into a subject and to describe a subject
//! through a [`UserInfoSink`].

use async_trait::async_trait;
use base64::Engine;
use log::debug;
use thiserror::Error;

use super::userinfo::UserInfoSink;
use crate::config::{AccessConfig, User};

/// Failures of a [`UserRepo`]
#[derive(Debug, Error)]
pub enum UserRepoError {
    /// Unknown user or wrong password; callers must not tell them apart
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unknown subject")]
    UnknownSubject,

    /// Backend failure
    #[error("user repository failure: {0}")]
    Backend(String),
}

/// Credential and profile provider consumed by the engine
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Validate credentials and return the subject
    ///
    /// # Arguments
    /// * `email` - Login identifier typed in the login UI
    /// * `password` - Plaintext password
    /// * `request_id` - Authorization request the login belongs to
    ///
    /// # Returns
    /// * `Ok(String)` - The subject; an empty subject is treated as a failure
    /// * `Err(UserRepoError)` - Credentials rejected or backend failure
    async fn subject(
        &self,
        email: &str,
        password: &str,
        request_id: &str,
    ) -> Result<String, UserRepoError>;

    /// Populate standard claims for `subject`
    ///
    /// The engine sets `sub` itself after this call returns.
    async fn info(
        &self,
        subject: &str,
        scopes: &[String],
        sink: &mut (dyn UserInfoSink + Send),
    ) -> Result<(), UserRepoError>;
}

/// User repository reading the users declared in the configuration
#[derive(Debug, Clone)]
pub struct StaticUserRepo {
    access: AccessConfig,
}

impl StaticUserRepo {
    pub fn new(access: AccessConfig) -> Self {
        Self { access }
    }
}

/// Verify a password against a base64-encoded crypt hash
///
/// The hash is produced by `openssl passwd -5 <password> | base64 -w0`; the
/// trailing newline kept by that pipeline is stripped before verification.
pub fn verify_password(password: &str, encoded_hash: &str) -> bool {
    let Ok(hash_bytes) = base64::engine::general_purpose::STANDARD.decode(encoded_hash) else {
        return false;
    };
    let hash_bytes = hash_bytes.strip_suffix(b"\n").unwrap_or(&hash_bytes[..]);
    let hash_bytes = hash_bytes.strip_suffix(b"\r").unwrap_or(hash_bytes);
    match std::str::from_utf8(hash_bytes) {
        Ok(stored_hash) => pwhash::unix::verify(password, stored_hash),
        Err(_) => false,
    }
}

#[async_trait]
impl UserRepo for StaticUserRepo {
    async fn subject(
        &self,
        email: &str,
        password: &str,
        request_id: &str,
    ) -> Result<String, UserRepoError> {
        let user: Option<&User> = self.access.find_by_email(email);
        match user {
            Some(user) if verify_password(password, &user.pass) => Ok(user.subject.clone()),
            _ => {
                debug!("Credential check failed for request {}", request_id);
                Err(UserRepoError::InvalidCredentials)
            }
        }
    }

    async fn info(
        &self,
        subject: &str,
        scopes: &[String],
        sink: &mut (dyn UserInfoSink + Send),
    ) -> Result<(), UserRepoError> {
        let user = self
            .access
            .find_by_subject(subject)
            .ok_or(UserRepoError::UnknownSubject)?;

        if scopes.iter().any(|s| s == "email") {
            sink.set_email(&user.email);
            sink.set_email_verified(user.email_verified);
        }
        if scopes.iter().any(|s| s == "profile") {
            if let Some(name) = &user.name {
                sink.set_name(name);
            }
        }
        Ok(())
    }
}
