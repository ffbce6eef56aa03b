//! Best-effort response caches keyed by content hash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Key/value store shared across concurrent map tasks
pub trait Cache: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, CacheError>;

    fn set(&self, namespace: &str, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), CacheError>;
}

/// Hex SHA-256 over the parts, separated so that ("ab", "c") != ("a", "bc")
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// In-process cache; expired entries are purged on every write
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, String), (Value, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let slot = (namespace.to_string(), key.to_string());
        match entries.get(&slot) {
            Some((_, Some(expires))) if *expires <= Instant::now() => {
                entries.remove(&slot);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, namespace: &str, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let now = Instant::now();
        entries.retain(|_, (_, expires)| expires.is_none_or(|expires| expires > now));
        let expires = ttl.map(|ttl| now + ttl);
        entries.insert((namespace.to_string(), key.to_string()), (value.clone(), expires));
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    stored_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    value: Value,
}

/// One JSON file per entry under `<root>/<namespace>/<key>.json`.
///
/// Reads and writes are blocking `std::fs` calls; async callers should
/// run them on the blocking pool, as [`crate::llm::CachedLlmClient`] does.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        let safe = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect()
        };
        self.root.join(safe(namespace)).join(format!("{}.json", safe(key)))
    }
}

impl Cache for FileCache {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.entry_path(namespace, key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry = serde_json::from_str(&content)?;
        if entry.expires_at.is_some_and(|expires| expires <= Utc::now()) {
            std::fs::remove_file(&path)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn set(&self, namespace: &str, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let path = self.entry_path(namespace, key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let stored_at = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| stored_at + ttl);
        let entry = FileEntry {
            stored_at,
            expires_at,
            value: value.clone(),
        };

        // Write then rename so concurrent readers never see a partial file
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        std::fs::write(&tmp, serde_json::to_vec(&entry)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
