use crate::hypermon_logic::config::AppConfig;
use lib_common::connections::{CacheStore, CacheStoreError, MemoryStore, RedisStore};
use lib_common::core::Dispatcher;
use lib_common::retrieve::Fetcher;
use std::sync::Arc;

/// Picks the cache store: Redis when a URL is configured, memory otherwise.
pub fn cache_store(config: &AppConfig) -> Result<Arc<dyn CacheStore>, CacheStoreError> {
    match config.redis_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let store = RedisStore::new(url)?;
            tracing::info!(key = store.key(), "keyed-nodes cache in Redis");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("keyed-nodes cache in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Builds the shared dispatcher for the HTTP surface.
pub fn build_dispatcher(config: &AppConfig) -> Result<Arc<Dispatcher>, CacheStoreError> {
    let store = cache_store(config)?;
    let fetcher = Arc::new(Fetcher::new());
    Ok(Arc::new(Dispatcher::new(config.pipeline_settings(), fetcher, store)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_by_default() {
        assert!(build_dispatcher(&AppConfig::defaults()).is_ok());
    }

    #[test]
    fn test_bad_redis_url_is_rejected() {
        let config = AppConfig {
            redis_url: Some("not a url".into()),
            ..AppConfig::defaults()
        };
        assert!(build_dispatcher(&config).is_err());
    }
}
