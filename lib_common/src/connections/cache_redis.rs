//! # Redis Cache Store
//!
//! Keeps the presence snapshot in Redis as one JSON document, so several
//! server processes share it. A `SET` of the whole document is the atomic
//! replacement.

use super::cache_store::{CacheEntry, CacheStore, CacheStoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use tokio::sync::OnceCell;

/// Key the keyed-nodes snapshot lives under.
pub const DEFAULT_KEY: &str = "hypermon:keyed-nodes";

/// A [`CacheStore`] on a Redis server.
pub struct RedisStore {
    /// The internal Redis client instance.
    client: Client,
    /// Built on first use, then cloned for every command.
    manager: OnceCell<ConnectionManager>,
    key: String,
}

impl RedisStore {
    /// Creates a store from a connection string.
    ///
    /// # Arguments
    /// * `url` - The redis URL (e.g., "redis://127.0.0.1/").
    pub fn new(url: &str) -> RedisResult<Self> {
        Self::with_key(url, DEFAULT_KEY)
    }

    pub fn with_key(url: &str, key: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            manager: OnceCell::new(),
            key: key.to_string(),
        })
    }

    /// A handle on the shared connection; reconnects are the manager's job.
    async fn connection(&self) -> RedisResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }

    /// Whether the shared connection has been established yet.
    pub fn is_connected(&self) -> bool {
        self.manager.initialized()
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self) -> Result<Option<CacheEntry>, CacheStoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(&self.key).await?;
        match raw {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheStoreError> {
        let doc = serde_json::to_string(&entry)?;
        let mut conn = self.connection().await?;
        let _: () = conn.set(&self.key, doc).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_url() {
        assert!(RedisStore::new("not a url").is_err());
    }

    #[test]
    fn test_uses_default_key() {
        let store = RedisStore::new("redis://127.0.0.1/").unwrap();
        assert_eq!(store.key(), DEFAULT_KEY);
        assert!(!store.is_connected());
    }
}
