//! Result Cache: memoizes validated task records by content fingerprint.
//!
//! Two layers: an in-process map, and an optional directory holding one JSON
//! file per entry (`<task>_<digest>.json`) so results survive restarts.
//! Entries never expire; they leave only through `invalidate`.
//!
//! A fingerprint is computed at most once while it stays cached: the first
//! caller takes a per-key fill lock, later callers for the same key wait on
//! it and then read the stored value. Failed computations store nothing.

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::models::{JobDescription, ResumeRecord};
use crate::schema::TaskKind;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cache write task failed: {0}")]
    Join(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Fingerprints
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub task: TaskKind,
    /// Hex SHA-256 over the task kind and both inputs.
    pub digest: String,
}

impl Fingerprint {
    pub fn of(task: TaskKind, resume: &ResumeRecord, job: &JobDescription) -> Self {
        Self {
            task,
            digest: sha256_hex(&format!("{}\0{}", task.as_str(), pair_material(resume, job))),
        }
    }

    /// Task-independent digest of the (resume, job description) pair.
    pub fn pair(resume: &ResumeRecord, job: &JobDescription) -> String {
        sha256_hex(&pair_material(resume, job))
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.task.as_str(), self.digest)
    }
}

fn pair_material(resume: &ResumeRecord, job: &JobDescription) -> String {
    let mut material = resume.canonical_text();
    material.push('\0');
    material.push_str(&job.text);
    material.push('\0');
    // Caller-supplied requirements can differ for the same text.
    for req in &job.requirements {
        material.push_str(&format!("{}\t{}\n", req.id, req.text));
    }
    material
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

// ────────────────────────────────────────────────────────────────────────────
// Cache
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub entries: usize,
}

pub struct ResultCache {
    memory: Mutex<HashMap<Fingerprint, Value>>,
    inflight: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
    disk_dir: Option<PathBuf>,
    counters: CacheCounters,
}

impl ResultCache {
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn new(disk_dir: Option<PathBuf>) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            disk_dir,
            counters: CacheCounters::default(),
        }
    }

    /// Returns the cached value for `key`, or runs `compute` and stores its
    /// success. Concurrent callers for the same key share one computation.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &Fingerprint, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.lookup(key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let fill = self.acquire_fill_lock(key).await;
        let result = self.fill(key, compute).await;
        self.release_fill_lock(key, fill).await;
        result
    }

    /// Runs under the fill lock for `key`.
    async fn fill<T, E, F, Fut>(&self, key: &Fingerprint, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Another caller may have filled the entry while we waited.
        if let Some(value) = self.lookup(key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.counters.computations.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {}, computing", key.file_name());

        let value = compute().await?;
        let json = serde_json::to_value(&value).map_err(CacheError::from)?;
        self.memory.lock().await.insert(key.clone(), json.clone());

        if let Some(dir) = &self.disk_dir {
            if let Err(e) = write_json_atomic(dir.clone(), key.file_name(), json).await {
                warn!("Failed to persist cache entry {}: {e}", key.file_name());
            }
        }

        Ok(value)
    }

    /// Drops `key` from memory and disk. Returns whether anything was removed.
    pub async fn invalidate(&self, key: &Fingerprint) -> Result<bool, CacheError> {
        let fill = self.acquire_fill_lock(key).await;
        let result = self.remove_entry(key).await;
        self.release_fill_lock(key, fill).await;
        result
    }

    async fn remove_entry(&self, key: &Fingerprint) -> Result<bool, CacheError> {
        let mut removed = self.memory.lock().await.remove(key).is_some();

        if let Some(dir) = &self.disk_dir {
            let path = dir.join(key.file_name());
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }

        Ok(removed)
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            entries: self.memory.lock().await.len(),
        }
    }

    async fn acquire_fill_lock(&self, key: &Fingerprint) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Drops the guard and forgets the lock once no other caller holds or
    /// waits on it. Clones only happen under the `inflight` lock.
    async fn release_fill_lock(&self, key: &Fingerprint, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut inflight = self.inflight.lock().await;
        if inflight
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            inflight.remove(key);
        }
    }

    #[cfg(test)]
    async fn inflight_len(&self) -> usize {
        self.inflight.lock().await.len()
    }

    /// Memory first, then disk. Undecodable entries count as misses.
    async fn lookup<T: DeserializeOwned>(&self, key: &Fingerprint) -> Option<T> {
        let in_memory = self.memory.lock().await.get(key).cloned();
        if let Some(value) = in_memory {
            match serde_json::from_value(value) {
                Ok(typed) => return Some(typed),
                Err(e) => {
                    warn!("Cached entry {} does not decode: {e}", key.file_name());
                    return None;
                }
            }
        }

        let dir = self.disk_dir.as_ref()?;
        let path = dir.join(key.file_name());
        let value = read_entry(&path).await?;
        match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => {
                debug!("Loaded cache entry {} from disk", key.file_name());
                self.memory.lock().await.insert(key.clone(), value);
                Some(typed)
            }
            Err(e) => {
                warn!("Ignoring cache file {}: {e}", path.display());
                None
            }
        }
    }
}

async fn read_entry(path: &Path) -> Option<Value> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Ignoring unreadable cache file {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring corrupt cache file {}: {e}", path.display());
            None
        }
    }
}

/// Writes pretty JSON through a temp file in the same directory, then renames
/// it into place. Shared by the disk cache and the CLI artifacts.
pub(crate) async fn write_json_atomic(
    dir: PathBuf,
    file_name: String,
    value: Value,
) -> Result<PathBuf, CacheError> {
    tokio::task::spawn_blocking(move || -> Result<PathBuf, CacheError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| CacheError::Io { path, source }
        };

        std::fs::create_dir_all(&dir).map_err(io(&dir))?;
        let bytes = serde_json::to_vec_pretty(&value)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io(&dir))?;
        tmp.write_all(&bytes).map_err(io(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io(tmp.path()))?;

        let target = dir.join(&file_name);
        tmp.persist(&target).map_err(|e| CacheError::Io {
            path: target.clone(),
            source: e.error,
        })?;
        Ok(target)
    })
    .await
    .map_err(|e| CacheError::Join(e.to_string()))?
}
