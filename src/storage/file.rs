// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! File-backed config store
//!
//! The signing material is kept as a JSON document in the data directory.
//! The config lock is a lock file created with `create_new`, so that several
//! processes sharing the directory agree on who generates the key on first
//! boot. Lock files older than the stale threshold are assumed to belong to
//! a crashed process and are removed.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{ConfigRepo, StorageError};
use crate::utility::SigningMaterial;

const MATERIAL_FILE: &str = "signing_key.json";
const LOCK_FILE: &str = "signing_key.lock";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Config store persisting the signing material under a directory
pub struct FileConfigRepo {
    dir: PathBuf,
    lock_timeout: Duration,
    stale_after: Duration,
    /// Whether this instance currently owns the lock file
    held: Mutex<bool>,
}

impl FileConfigRepo {
    /// Create a store rooted at `dir`
    ///
    /// ### Arguments
    ///
    /// * `dir` - Directory holding the material and lock files, created on first load
    /// * `lock_timeout` - How long [`ConfigRepo::load`] waits for the lock
    pub fn new<P: AsRef<Path>>(dir: P, lock_timeout: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            lock_timeout,
            stale_after: Duration::from_secs(300),
            held: Mutex::new(false),
        }
    }

    /// Override the age after which a foreign lock file is considered stale
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn material_path(&self) -> PathBuf {
        self.dir.join(MATERIAL_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    async fn is_stale(&self, lock_path: &Path) -> bool {
        match fs::metadata(lock_path).await.and_then(|m| m.modified()) {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .map(|age| age > self.stale_after)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn acquire(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;
        let lock_path = self.lock_path();
        let deadline = tokio::time::Instant::now() + self.lock_timeout;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(file) => {
                    write_lock_owner(file, &lock_path).await?;
                    debug!("Acquired config lock {:?}", lock_path);
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.is_stale(&lock_path).await {
                        warn!("Removing stale config lock {:?}", lock_path);
                        match fs::remove_file(&lock_path).await {
                            Ok(()) => continue,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(StorageError::Lock(format!(
                            "timed out waiting for {:?}",
                            lock_path
                        )));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Record the owning process in a freshly created lock file
///
/// The lock is not held until this succeeds, so on failure the file is
/// removed here; `unlock` would leave it for the stale threshold.
async fn write_lock_owner<W: AsyncWrite + Unpin>(
    mut file: W,
    lock_path: &Path,
) -> Result<(), StorageError> {
    let owner = format!("{}\n", std::process::id());
    let written = match file.write_all(owner.as_bytes()).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(file);
        if let Err(remove) = fs::remove_file(lock_path).await {
            warn!("Failed to remove config lock {:?}: {}", lock_path, remove);
        }
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ConfigRepo for FileConfigRepo {
    async fn load(&self) -> Result<Option<SigningMaterial>, StorageError> {
        self.acquire().await?;
        *self.held.lock().await = true;

        let path = self.material_path();
        match fs::read_to_string(&path).await {
            Ok(contents) => {
                debug!("Loading signing material from {:?}", path);
                Ok(Some(serde_json::from_str(&contents)?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, material: &SigningMaterial) -> Result<(), StorageError> {
        if !*self.held.lock().await {
            return Err(StorageError::Lock("config lock is not held".to_string()));
        }

        let path = self.material_path();
        let tmp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(material)?;
        fs::write(&tmp_path, contents).await?;
        fs::rename(&tmp_path, &path).await?;
        info!("Signing material persisted to {:?}", path);
        Ok(())
    }

    async fn unlock(&self) -> Result<(), StorageError> {
        let mut held = self.held.lock().await;
        if !*held {
            return Ok(());
        }
        match fs::remove_file(self.lock_path()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *held = false;
        debug!("Released config lock {:?}", self.lock_path());
        Ok(())
    }
}
