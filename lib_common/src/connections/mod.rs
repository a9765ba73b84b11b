//! # Connections Module
//!
//! Shared state that survives between requests: the presence cache for the
//! keyed-nodes feed and the stores it can sit on.

/// The single-slot store trait, its entry type and the in-memory store.
pub mod cache_store;

/// Redis-backed store for deployments running several server processes.
pub mod cache_redis;

/// TTL cache with stale fallback around the keyed-nodes feed.
pub mod presence_cache;

pub use cache_redis::RedisStore;
pub use cache_store::{CacheEntry, CacheStore, CacheStoreError, MemoryStore};
pub use presence_cache::{Freshness, PresenceCache, PresenceRead};
