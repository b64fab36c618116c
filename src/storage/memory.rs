// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-process stores
//!
//! [`MemoryRequestRepo`] is the default request store. [`MemoryConfigRepo`]
//! keeps the signing material for the lifetime of the process, which is
//! enough for tests and ephemeral deployments.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};

use super::{ConfigRepo, RequestRepo, StorageError};
use crate::auth::oauth2::AuthRequest;
use crate::utility::SigningMaterial;

#[derive(Default)]
struct RequestTables {
    rows: HashMap<String, AuthRequest>,
    /// code -> request id
    by_code: HashMap<String, String>,
    /// subject -> request ids, ordered by id (and therefore by creation time)
    by_subject: HashMap<String, BTreeSet<String>>,
}

impl RequestTables {
    fn unindex(&mut self, request: &AuthRequest) {
        if let Some(code) = &request.code {
            if self.by_code.get(code) == Some(&request.id) {
                self.by_code.remove(code);
            }
        }
        if let Some(subject) = &request.subject {
            if let Some(ids) = self.by_subject.get_mut(subject) {
                ids.remove(&request.id);
                if ids.is_empty() {
                    self.by_subject.remove(subject);
                }
            }
        }
    }

    fn index(&mut self, request: &AuthRequest) {
        if let Some(code) = &request.code {
            self.by_code.insert(code.clone(), request.id.clone());
        }
        if let Some(subject) = &request.subject {
            self.by_subject
                .entry(subject.clone())
                .or_default()
                .insert(request.id.clone());
        }
    }
}

/// Request store backed by hash maps behind a `RwLock`
///
/// The code and subject indexes are maintained on every save and remove.
#[derive(Clone, Default)]
pub struct MemoryRequestRepo {
    tables: Arc<RwLock<RequestTables>>,
}

impl MemoryRequestRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests
    pub async fn len(&self) -> usize {
        self.tables.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RequestRepo for MemoryRequestRepo {
    async fn find_by_id(&self, id: &str) -> Result<AuthRequest, StorageError> {
        let tables = self.tables.read().await;
        tables.rows.get(id).cloned().ok_or(StorageError::NotFound)
    }

    async fn find_by_code(&self, code: &str) -> Result<AuthRequest, StorageError> {
        let tables = self.tables.read().await;
        tables
            .by_code
            .get(code)
            .and_then(|id| tables.rows.get(id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn find_by_subject(&self, subject: &str) -> Result<AuthRequest, StorageError> {
        let tables = self.tables.read().await;
        tables
            .by_subject
            .get(subject)
            .and_then(|ids| ids.iter().next_back())
            .and_then(|id| tables.rows.get(id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn save(&self, request: &AuthRequest) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;

        if let Some(code) = &request.code {
            if let Some(owner) = tables.by_code.get(code) {
                if owner != &request.id {
                    return Err(StorageError::Conflict("authorization code".to_string()));
                }
            }
        }

        if let Some(previous) = tables.rows.remove(&request.id) {
            tables.unindex(&previous);
        }
        tables.index(request);
        tables.rows.insert(request.id.clone(), request.clone());
        debug!("Saved authorization request {}", request.id);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let previous = tables.rows.remove(id).ok_or(StorageError::NotFound)?;
        tables.unindex(&previous);
        debug!("Removed authorization request {}", id);
        Ok(())
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut tables = self.tables.write().await;
        let stale: Vec<String> = tables
            .rows
            .values()
            .filter(|request| request.created_at < cutoff)
            .map(|request| request.id.clone())
            .collect();
        for id in &stale {
            if let Some(previous) = tables.rows.remove(id) {
                tables.unindex(&previous);
            }
        }
        Ok(stale.len())
    }
}

/// Config store holding the signing material in memory
///
/// The config lock is a single-permit semaphore; the permit taken by
/// [`ConfigRepo::load`] is parked until [`ConfigRepo::unlock`].
pub struct MemoryConfigRepo {
    material: RwLock<Option<SigningMaterial>>,
    lock: Arc<Semaphore>,
    held: Mutex<Option<OwnedSemaphorePermit>>,
    lock_timeout: Duration,
}

impl Default for MemoryConfigRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigRepo {
    pub fn new() -> Self {
        Self {
            material: RwLock::new(None),
            lock: Arc::new(Semaphore::new(1)),
            held: Mutex::new(None),
            lock_timeout: Duration::from_secs(30),
        }
    }

    /// Store pre-existing material, as if persisted by an earlier boot
    pub fn with_material(material: SigningMaterial) -> Self {
        Self {
            material: RwLock::new(Some(material)),
            ..Self::new()
        }
    }

    /// Currently stored material, without taking the lock
    pub async fn stored(&self) -> Option<SigningMaterial> {
        self.material.read().await.clone()
    }

    /// Whether the config lock is currently held
    pub async fn is_locked(&self) -> bool {
        self.held.lock().await.is_some()
    }
}

#[async_trait]
impl ConfigRepo for MemoryConfigRepo {
    async fn load(&self) -> Result<Option<SigningMaterial>, StorageError> {
        let permit = tokio::time::timeout(self.lock_timeout, self.lock.clone().acquire_owned())
            .await
            .map_err(|_| StorageError::Lock("timed out waiting for the config lock".to_string()))?
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        *self.held.lock().await = Some(permit);
        Ok(self.material.read().await.clone())
    }

    async fn save(&self, material: &SigningMaterial) -> Result<(), StorageError> {
        if self.held.lock().await.is_none() {
            return Err(StorageError::Lock("config lock is not held".to_string()));
        }
        *self.material.write().await = Some(material.clone());
        Ok(())
    }

    async fn unlock(&self) -> Result<(), StorageError> {
        // Dropping the permit releases the semaphore
        self.held.lock().await.take();
        Ok(())
    }
}
