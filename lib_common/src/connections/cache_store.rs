//! # Cache Store
//!
//! Storage behind the presence cache. A store holds at most one
//! [`CacheEntry`] and replaces it whole on every `set`; readers see either
//! the old entry or the new one, never a mix.

use crate::scrape::NodeRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// One snapshot of the keyed feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fetched_at: DateTime<Utc>,
    pub nodes: Vec<NodeRecord>,
}

impl CacheEntry {
    pub fn new(nodes: Vec<NodeRecord>) -> Self {
        Self {
            fetched_at: Utc::now(),
            nodes,
        }
    }

    /// Whole seconds since the snapshot was taken; 0 for clock skew.
    pub fn age_seconds(&self) -> u64 {
        (Utc::now() - self.fetched_at).num_seconds().max(0) as u64
    }

    /// Younger than `ttl_seconds`. A TTL too large for a `chrono::Duration`
    /// never expires.
    pub fn is_fresh(&self, ttl_seconds: u64) -> bool {
        match i64::try_from(ttl_seconds).ok().and_then(chrono::Duration::try_seconds) {
            Some(ttl) => Utc::now() - self.fetched_at < ttl,
            None => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache entry could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A single-slot store with atomic replace semantics.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self) -> Result<Option<CacheEntry>, CacheStoreError>;
    async fn set(&self, entry: CacheEntry) -> Result<(), CacheStoreError>;
}

/// In-process store. The entry sits behind an `Arc` so a `set` is a pointer
/// swap under the write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: RwLock<Option<Arc<CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self) -> Result<Option<CacheEntry>, CacheStoreError> {
        let guard = self.slot.read().await;
        Ok(guard.as_deref().cloned())
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheStoreError> {
        let mut guard = self.slot.write().await;
        *guard = Some(Arc::new(entry));
        Ok(())
    }
}
