// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Persistence contracts of the authorization server
//!
//! The engine only depends on two stores:
//!
//! - [`RequestRepo`] holds the mutable state of in-flight authorizations,
//!   with secondary lookups by authorization code and by subject.
//! - [`ConfigRepo`] holds the singleton signing key material. Loading it
//!   takes the config lock, which is held until [`ConfigRepo::unlock`].
//!
//! Default adapters live in [`memory`] and [`file`].

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::oauth2::AuthRequest;
use crate::utility::SigningMaterial;

pub use file::FileConfigRepo;
pub use memory::{MemoryConfigRepo, MemoryRequestRepo};

/// Errors returned by the stores
#[derive(Debug, Error)]
pub enum StorageError {
    /// The looked-up entity does not exist
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint would be violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// The config lock could not be acquired or released
    #[error("lock error: {0}")]
    Lock(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Store of authorization requests
///
/// Each operation is individually atomic. There are no transactions: a
/// request is only mutated by the user agent holding its id, and concurrent
/// saves of the same row are last-writer-wins.
#[async_trait]
pub trait RequestRepo: Send + Sync {
    /// Find a request by its id
    ///
    /// # Returns
    /// * `Ok(AuthRequest)` - The stored request
    /// * `Err(StorageError::NotFound)` - No request with this id
    async fn find_by_id(&self, id: &str) -> Result<AuthRequest, StorageError>;

    /// Find the request an authorization code was issued for
    async fn find_by_code(&self, code: &str) -> Result<AuthRequest, StorageError>;

    /// Find the most recent request authorized for a subject
    async fn find_by_subject(&self, subject: &str) -> Result<AuthRequest, StorageError>;

    /// Insert or replace a request by id
    ///
    /// # Returns
    /// * `Err(StorageError::Conflict)` - The code is already bound to another request
    async fn save(&self, request: &AuthRequest) -> Result<(), StorageError>;

    /// Remove a request by id
    ///
    /// # Returns
    /// * `Err(StorageError::NotFound)` - No request with this id
    async fn remove(&self, id: &str) -> Result<(), StorageError>;

    /// Drop every request created before `cutoff`, whatever its state
    ///
    /// # Returns
    /// The number of removed requests
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// Store of the singleton signing key material
#[async_trait]
pub trait ConfigRepo: Send + Sync {
    /// Acquire the config lock and read the stored material
    ///
    /// The lock stays held, even when an error is returned, until
    /// [`ConfigRepo::unlock`] is called.
    ///
    /// # Returns
    /// * `Ok(Some(_))` - Material persisted by a previous boot
    /// * `Ok(None)` - Nothing stored yet
    async fn load(&self) -> Result<Option<SigningMaterial>, StorageError>;

    /// Persist the material; only valid while the lock is held
    async fn save(&self, material: &SigningMaterial) -> Result<(), StorageError>;

    /// Release the config lock
    async fn unlock(&self) -> Result<(), StorageError>;
}
