//! Generation-keyed cache storage.
//!
//! A [`CacheStorage`] holds named caches, one per generation. Each cache maps
//! a [`CacheKey`] (GET + URL without fragment) to an immutable
//! [`CacheEntry`]. Entries are stored behind `Arc`, so an overwrite swaps the
//! pointer and readers only ever see a complete entry.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use multiapp_net::{Request, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::trace;
use url::Url;

use crate::CacheError;

// ==================== Keys ====================

/// Normalized lookup key. Only GET requests have one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a URL, ignoring its fragment.
    pub fn for_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.into())
    }

    /// Key for a request, or `None` when the method is not cacheable.
    pub fn for_request(request: &Request) -> Option<Self> {
        if request.method == Method::GET {
            Some(Self::for_url(&request.url))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ==================== Entries ====================

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a network response.
    pub fn from_response(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Result<Response, CacheError> {
        let url = Url::parse(&self.url).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let status =
            StatusCode::from_u16(self.status).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let mut response = Response::new(url, status).with_body(self.body.clone());
        for (name, value) in &self.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| CacheError::Corrupt(e.to_string()))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| CacheError::Corrupt(e.to_string()))?;
            response.headers.insert(name, value);
        }
        Ok(response)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==================== Storage ====================

/// Named caches keyed by generation.
///
/// Implementations must be safe under concurrent calls; `put` on an existing
/// key replaces the entry atomically.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it if missing.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// All cache names, sorted.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a cache and all its entries.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Look up an entry in one cache.
    async fn match_entry(
        &self,
        name: &str,
        key: &CacheKey,
    ) -> Result<Option<Arc<CacheEntry>>, CacheError>;

    /// Store an entry, creating the cache if needed.
    async fn put(&self, name: &str, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError>;

    /// Keys stored in one cache, sorted.
    async fn entry_keys(&self, name: &str) -> Result<Vec<CacheKey>, CacheError>;
}

/// Serializable copy of a whole storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub caches: Vec<CacheSnapshot>,
}

/// Serializable copy of one cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub name: String,
    pub entries: Vec<(CacheKey, CacheEntry)>,
}

type Generation = HashMap<CacheKey, Arc<CacheEntry>>;

/// In-memory cache storage.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Generation>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild storage from a snapshot.
    pub fn from_snapshot(snapshot: StorageSnapshot) -> Self {
        let caches = snapshot
            .caches
            .into_iter()
            .map(|cache| {
                let entries = cache
                    .entries
                    .into_iter()
                    .map(|(key, entry)| (key, Arc::new(entry)))
                    .collect();
                (cache.name, entries)
            })
            .collect();

        Self {
            caches: RwLock::new(caches),
        }
    }

    /// Copy every cache into a snapshot.
    pub async fn snapshot(&self) -> StorageSnapshot {
        let caches = self.caches.read().await;
        let mut names: Vec<&String> = caches.keys().collect();
        names.sort();

        let caches = names
            .into_iter()
            .map(|name| {
                let mut entries: Vec<(CacheKey, CacheEntry)> = caches[name]
                    .iter()
                    .map(|(key, entry)| (key.clone(), CacheEntry::clone(entry)))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                CacheSnapshot {
                    name: name.clone(),
                    entries,
                }
            })
            .collect();

        StorageSnapshot { caches }
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn match_entry(
        &self,
        name: &str,
        key: &CacheKey,
    ) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        let caches = self.caches.read().await;
        Ok(caches.get(name).and_then(|cache| cache.get(key)).cloned())
    }

    async fn put(&self, name: &str, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        trace!(cache = name, key = key.as_str(), "Storing entry");
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key, Arc::new(entry));
        Ok(())
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<CacheKey>, CacheError> {
        let caches = self.caches.read().await;
        let mut keys: Vec<CacheKey> = caches
            .get(name)
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
