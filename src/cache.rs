//! Prompt → response cache used by the completion gateway.
//!
//! The [`PromptCache`] trait is injected into the gateway so the backing
//! store can be swapped:
//! - **[`InMemoryCache`]**: process-lifetime `HashMap`, shared by every run
//!   in the process.
//! - **[`JsonFileCache`]**: the same map mirrored into a JSON file so
//!   repeated CLI runs reuse earlier responses.
//! - **[`DisabledCache`]**: never hits, never stores.
//!
//! Keys are the exact prompt text. Entries are never evicted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};

use crate::config::CacheConfig;

/// Backing store for memoized completions.
///
/// Implementations must be `Send + Sync`; a single cache is shared across
/// concurrent pipeline runs.
pub trait PromptCache: Send + Sync {
    /// Returns a previously stored response for exactly this prompt.
    fn get(&self, prompt: &str) -> Option<String>;

    /// Stores a response. Existing entries for the same prompt are replaced.
    fn put(&self, prompt: &str, response: &str) -> Result<()>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the cache selected by `[cache].backend`.
pub fn create_cache(config: &CacheConfig) -> Result<Arc<dyn PromptCache>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryCache::new())),
        "file" => Ok(Arc::new(JsonFileCache::open(&config.path)?)),
        "disabled" => Ok(Arc::new(DisabledCache)),
        other => bail!("Unknown cache backend: {}", other),
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PromptCache for InMemoryCache {
    fn get(&self, prompt: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(prompt).cloned())
    }

    fn put(&self, prompt: &str, response: &str) -> Result<()> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("prompt cache lock poisoned"))?;
        map.insert(prompt.to_string(), response.to_string());
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }
}

// ============ JSON file ============

/// In-memory map persisted as a single JSON object on every write.
pub struct JsonFileCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileCache {
    /// Open (or start) a cache file. A missing file is an empty cache; an
    /// unreadable one is an error.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse cache file: {}", path.display()))?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(map)?)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;
        Ok(())
    }
}

impl PromptCache for JsonFileCache {
    fn get(&self, prompt: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(prompt).cloned())
    }

    fn put(&self, prompt: &str, response: &str) -> Result<()> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("prompt cache lock poisoned"))?;
        map.insert(prompt.to_string(), response.to_string());
        self.persist(&map)
    }

    fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }
}

// ============ Disabled ============

pub struct DisabledCache;

impl PromptCache for DisabledCache {
    fn get(&self, _prompt: &str) -> Option<String> {
        None
    }

    fn put(&self, _prompt: &str, _response: &str) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_exact_key() {
        let cache = InMemoryCache::new();
        cache.put("prompt", "answer").unwrap();
        assert_eq!(cache.get("prompt").as_deref(), Some("answer"));
        assert_eq!(cache.get("prompt "), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_file_cache_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cache").join("llm_cache.json");

        let cache = JsonFileCache::open(&path).unwrap();
        assert!(cache.is_empty());
        cache.put("p1", "r1").unwrap();

        let reopened = JsonFileCache::open(&path).unwrap();
        assert_eq!(reopened.get("p1").as_deref(), Some("r1"));
    }

    #[test]
    fn test_file_cache_rejects_garbage() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("llm_cache.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(JsonFileCache::open(&path).is_err());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = DisabledCache;
        cache.put("p", "r").unwrap();
        assert_eq!(cache.get("p"), None);
    }
}
