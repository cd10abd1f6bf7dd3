//! Local cache for UI-independent flags, scoped per wallet address
//!
//! Entries are advisory. Anything missing, unreadable or malformed is
//! reported as unknown and never surfaces as an error to callers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use stake_types::{Address, ApprovalState, StakeError, StakeResult, APPROVAL_CACHE_FIELD};
use tracing::{debug, warn};

/// Flat string key/value store
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Get a raw serialized value
    async fn get_raw(&self, key: &str) -> StakeResult<Option<String>>;

    /// Store a raw serialized value
    async fn set_raw(&self, key: &str, value: String) -> StakeResult<()>;

    /// Delete a key
    async fn delete(&self, key: &str) -> StakeResult<()>;
}

// ============================================================================
// Memory Cache
// ============================================================================

/// Process-local cache
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get_raw(&self, key: &str) -> StakeResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> StakeResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StakeResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// File Cache
// ============================================================================

/// Cache persisted as a single JSON object file
pub struct FileCache {
    path: PathBuf,
    // Serializes read-modify-write cycles
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries; an unreadable or malformed file reads as empty
    async fn read_entries(&self) -> HashMap<String, String> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!("Cache file {:?} unreadable, treating as empty: {}", self.path, e);
                return HashMap::new();
            }
        };

        match serde_json::from_str::<HashMap<String, String>>(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cache file {:?} malformed, treating as empty: {}", self.path, e);
                HashMap::new()
            }
        }
    }

    async fn write_entries(&self, entries: &HashMap<String, String>) -> StakeResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(StakeError::cache)?;
            }
        }

        let content = serde_json::to_string_pretty(entries).map_err(StakeError::cache)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, content).await.map_err(StakeError::cache)?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(StakeError::cache)?;
        Ok(())
    }
}

#[async_trait]
impl LocalCache for FileCache {
    async fn get_raw(&self, key: &str) -> StakeResult<Option<String>> {
        Ok(self.read_entries().await.remove(key))
    }

    async fn set_raw(&self, key: &str, value: String) -> StakeResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await;
        entries.insert(key.to_string(), value);
        self.write_entries(&entries).await
    }

    async fn delete(&self, key: &str) -> StakeResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await;
        if entries.remove(key).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Approval Cache
// ============================================================================

/// Typed access to the per-address approval flag
#[derive(Clone)]
pub struct ApprovalCache {
    cache: Arc<dyn LocalCache>,
    namespace: String,
}

impl ApprovalCache {
    pub fn new(cache: Arc<dyn LocalCache>, namespace: &str) -> Self {
        Self {
            cache,
            namespace: namespace.to_string(),
        }
    }

    pub fn key(&self, address: &Address) -> String {
        format!("{}:{}:{}", self.namespace, address, APPROVAL_CACHE_FIELD)
    }

    /// Last cached approval for `address`, `None` when unknown
    pub async fn load(&self, address: &Address) -> Option<ApprovalState> {
        let key = self.key(address);
        let raw = match self.cache.get_raw(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", key, e);
                return None;
            }
        };

        let state = decode_approval(&raw);
        if state.is_none() {
            warn!("Ignoring malformed cache entry {}: {:?}", key, raw);
        }
        state
    }

    /// Persist the approval for `address`
    pub async fn store(&self, address: &Address, state: &ApprovalState) -> StakeResult<()> {
        let key = self.key(address);
        let raw = serde_json::to_string(state).map_err(StakeError::cache)?;
        self.cache.set_raw(&key, raw).await?;
        debug!("Cached {} = {}", key, state.is_approved);
        Ok(())
    }

    pub async fn clear(&self, address: &Address) -> StakeResult<()> {
        self.cache.delete(&self.key(address)).await
    }
}

/// Accepts the full record or a bare JSON boolean
fn decode_approval(raw: &str) -> Option<ApprovalState> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::Bool(is_approved) => Some(ApprovalState {
            is_approved,
            as_of: DateTime::<Utc>::UNIX_EPOCH,
        }),
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}
