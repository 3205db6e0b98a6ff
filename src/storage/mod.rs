//! Key/value storage that keeps working when the preferred backend does not.

use crate::errors::HaulguardError;
use crate::utils::{atomic_write, ensure_dir, lock, safe_filename};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Pluggable storage backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether stored values survive a restart.
    fn is_persistent(&self) -> bool;

    /// Check that the backend is usable right now.
    async fn probe(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// One file per key inside a directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_filename(key)))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn is_persistent(&self) -> bool {
        true
    }

    async fn probe(&self) -> Result<()> {
        ensure_dir(&self.dir)?;
        let marker = self.dir.join(".probe");
        atomic_write(&marker, "ok")?;
        std::fs::remove_file(&marker)
            .with_context(|| format!("Failed to remove probe file in {}", self.dir.display()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        atomic_write(&self.path_for(key), value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    async fn clear(&self) -> Result<()> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", self.dir.display()));
            }
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

/// In-process map; lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        lock(&self.entries).clear();
        Ok(())
    }
}

/// Ordered list of backends; uses the first that probes healthy and moves
/// down the list when a write fails.
pub struct DegradedStorage {
    backends: Vec<Box<dyn StorageBackend>>,
    active: AtomicUsize,
}

impl DegradedStorage {
    /// Probe `backends` in order and activate the first available one.
    pub async fn new(backends: Vec<Box<dyn StorageBackend>>) -> Result<Self, HaulguardError> {
        if backends.is_empty() {
            return Err(HaulguardError::Storage("no storage backends configured".into()));
        }
        let storage = Self {
            backends,
            active: AtomicUsize::new(0),
        };
        let index = storage.first_available(0).await?;
        storage.activate(index);
        Ok(storage)
    }

    pub fn active_backend(&self) -> &str {
        self.current().name()
    }

    /// True when the active backend does not persist data.
    pub fn is_degraded(&self) -> bool {
        !self.current().is_persistent()
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, HaulguardError> {
        let backend = self.current();
        backend
            .get(key)
            .await
            .map_err(|e| storage_error(backend, &e))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), HaulguardError> {
        let index = self.active.load(Ordering::Acquire);
        let Err(e) = self.backends[index].set(key, value).await else {
            return Ok(());
        };
        warn!(
            backend = self.backends[index].name(),
            "storage write failed, failing over: {:#}", e
        );
        let next = self.first_available(index + 1).await?;
        self.activate(next);
        let backend = self.backends[next].as_ref();
        backend
            .set(key, value)
            .await
            .map_err(|e| storage_error(backend, &e))
    }

    pub async fn remove(&self, key: &str) -> Result<(), HaulguardError> {
        let backend = self.current();
        backend
            .remove(key)
            .await
            .map_err(|e| storage_error(backend, &e))
    }

    pub async fn clear(&self) -> Result<(), HaulguardError> {
        let backend = self.current();
        backend
            .clear()
            .await
            .map_err(|e| storage_error(backend, &e))
    }

    fn current(&self) -> &dyn StorageBackend {
        self.backends[self.active.load(Ordering::Acquire)].as_ref()
    }

    fn activate(&self, index: usize) {
        let backend = &self.backends[index];
        if backend.is_persistent() {
            info!(backend = backend.name(), "storage backend active");
        } else {
            warn!(
                backend = backend.name(),
                "storage running degraded: data will not survive a restart"
            );
        }
        self.active.store(index, Ordering::Release);
    }

    async fn first_available(&self, start: usize) -> Result<usize, HaulguardError> {
        for (index, backend) in self.backends.iter().enumerate().skip(start) {
            match backend.probe().await {
                Ok(()) => return Ok(index),
                Err(e) => warn!(backend = backend.name(), "storage probe failed: {:#}", e),
            }
        }
        Err(HaulguardError::Storage("no storage backend available".into()))
    }
}

fn storage_error(backend: &dyn StorageBackend, e: &anyhow::Error) -> HaulguardError {
    HaulguardError::Storage(format!("{}: {:#}", backend.name(), e))
}
