//! # Presence Cache
//!
//! A single-key, time-to-live cache in front of the "currently keyed nodes"
//! page. The page changes every few seconds but must not be fetched on
//! every client poll.
//!
//! ## Read policy
//! - Entry younger than the TTL: served as is, no network call.
//! - Otherwise refetch, replace the entry whole, serve the new nodes.
//! - Refetch failed but an entry exists (any age): serve it as stale.
//! - Refetch failed and nothing stored: empty list, `Freshness::Absent`.
//!
//! Refreshes are serialized by an async mutex; a caller that waited on it
//! re-checks the store first, so a burst of expired reads costs one fetch.

use super::cache_store::{CacheEntry, CacheStore};
use crate::retrieve::ky_http::{FetchError, FetchOptions, Fetcher};
use crate::scrape::{ColumnSchema, NodeRecord, NodeStatus, TableParser};
use std::sync::Arc;
use tokio::sync::Mutex;

/// How the nodes of a [`PresenceRead`] were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// From a live fetch or an entry within its TTL.
    Fresh,
    /// From an expired entry because the refresh failed.
    Stale,
    /// Nothing to serve.
    Absent,
}

/// Result of [`PresenceCache::read`].
#[derive(Debug, Clone)]
pub struct PresenceRead {
    pub nodes: Vec<NodeRecord>,
    pub freshness: Freshness,
    /// Served from the stored entry rather than a fetch made by this read.
    pub cached: bool,
    /// The refresh failure behind a `Stale` or `Absent` read.
    pub failure: Option<FetchError>,
}

impl PresenceRead {
    fn from_entry(entry: CacheEntry, freshness: Freshness, failure: Option<FetchError>) -> Self {
        Self {
            nodes: entry.nodes,
            freshness,
            cached: true,
            failure,
        }
    }
}

/// # Presence Cache
pub struct PresenceCache {
    fetcher: Arc<Fetcher>,
    parser: Arc<TableParser>,
    store: Arc<dyn CacheStore>,
    source_url: String,
    options: FetchOptions,
    schema: ColumnSchema,
    refresh_lock: Mutex<()>,
}

impl PresenceCache {
    pub fn new(
        fetcher: Arc<Fetcher>,
        parser: Arc<TableParser>,
        store: Arc<dyn CacheStore>,
        source_url: impl Into<String>,
        options: FetchOptions,
        schema: ColumnSchema,
    ) -> Self {
        Self {
            fetcher,
            parser,
            store,
            source_url: source_url.into(),
            options,
            schema,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Current entry, treating a broken store as an empty one.
    async fn stored(&self) -> Option<CacheEntry> {
        match self.store.get().await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "cache store read failed; treating as empty");
                None
            }
        }
    }

    /// Serves the keyed nodes under the read policy described above.
    pub async fn read(&self, ttl_seconds: u64) -> PresenceRead {
        if let Some(entry) = self.stored().await {
            if entry.is_fresh(ttl_seconds) {
                tracing::debug!(age = entry.age_seconds(), nodes = entry.nodes.len(), "presence cache hit");
                return PresenceRead::from_entry(entry, Freshness::Fresh, None);
            }
        }

        let _refresh = self.refresh_lock.lock().await;

        // Someone else may have refreshed while we waited.
        let previous = self.stored().await;
        if let Some(entry) = &previous {
            if entry.is_fresh(ttl_seconds) {
                tracing::debug!("presence cache refreshed by a concurrent reader");
                return PresenceRead::from_entry(entry.clone(), Freshness::Fresh, None);
            }
        }

        match self.fetcher.fetch(&self.source_url, &self.options).await {
            Ok(html) => {
                let mut nodes = self.parser.parse_nodes(&html, &self.schema);
                for node in &mut nodes {
                    node.status = Some(NodeStatus::Keyed);
                }

                let entry = CacheEntry::new(nodes.clone());
                if let Err(e) = self.store.set(entry).await {
                    tracing::warn!(error = %e, "cache store write failed; serving uncached result");
                }
                tracing::info!(nodes = nodes.len(), "presence cache refreshed");

                PresenceRead {
                    nodes,
                    freshness: Freshness::Fresh,
                    cached: false,
                    failure: None,
                }
            }
            Err(e) => match previous {
                Some(entry) => {
                    tracing::warn!(error = %e, age = entry.age_seconds(), "refresh failed; serving stale entry");
                    PresenceRead::from_entry(entry, Freshness::Stale, Some(e))
                }
                None => {
                    tracing::warn!(error = %e, "refresh failed with nothing cached");
                    PresenceRead {
                        nodes: Vec::new(),
                        freshness: Freshness::Absent,
                        cached: false,
                        failure: Some(e),
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::cache_store::MemoryStore;
    use crate::test_support::ScriptedTransport;

    const PAGE_ONE: &str = "<table><tr><th>Node</th></tr><tr><td>546</td><td>W1ABC</td><td>City,ST</td><td>5 connections</td></tr></table>";
    const PAGE_TWO: &str = "<table><tr><th>Node</th></tr><tr><td>777</td><td>K7AAA</td></tr><tr><td>778</td><td>K7BBB</td></tr></table>";

    fn cache_over(transport: Arc<ScriptedTransport>, store: Arc<MemoryStore>) -> PresenceCache {
        // Directory layout on purpose: the keyed stamp must come from the cache.
        PresenceCache::new(
            Arc::new(Fetcher::with_transport(transport)),
            Arc::new(TableParser::new()),
            store,
            "http://stats.example/keyed",
            FetchOptions::default(),
            ColumnSchema::directory(),
        )
    }

    #[tokio::test]
    async fn test_two_reads_within_ttl_fetch_once() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(PAGE_ONE),
            ScriptedTransport::ok(PAGE_TWO),
        ]);
        let cache = cache_over(transport.clone(), Arc::new(MemoryStore::new()));

        let first = cache.read(60).await;
        let second = cache.read(60).await;

        assert_eq!(transport.calls(), 1);
        assert_eq!(first.freshness, Freshness::Fresh);
        assert_eq!(second.freshness, Freshness::Fresh);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.nodes[0].number, "546");
        assert_eq!(first.nodes[0].status, Some(NodeStatus::Keyed));
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_serves_cached_entry() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(PAGE_ONE),
            ScriptedTransport::ok(PAGE_TWO),
        ]);
        let cache = cache_over(transport.clone(), Arc::new(MemoryStore::new()));

        cache.read(10_000_000_000_000_000).await;
        let second = cache.read(u64::MAX).await;

        assert_eq!(transport.calls(), 1);
        assert_eq!(second.freshness, Freshness::Fresh);
        assert!(second.cached);
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaced() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(PAGE_ONE),
            ScriptedTransport::ok(PAGE_TWO),
        ]);
        let store = Arc::new(MemoryStore::new());
        let cache = cache_over(transport.clone(), store.clone());

        cache.read(0).await;
        let second = cache.read(0).await;

        assert_eq!(transport.calls(), 2);
        assert_eq!(second.nodes.len(), 2);
        let stored = store.get().await.unwrap().unwrap();
        assert_eq!(stored.nodes, second.nodes);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale_entry() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(PAGE_ONE),
            Err(FetchError::Status(503)),
        ]);
        let cache = cache_over(transport.clone(), Arc::new(MemoryStore::new()));

        let first = cache.read(0).await;
        let second = cache.read(0).await;

        assert_eq!(transport.calls(), 2);
        assert_eq!(second.freshness, Freshness::Stale);
        assert!(second.cached);
        assert_eq!(second.nodes, first.nodes);
        assert_eq!(second.failure, Some(FetchError::Status(503)));
    }

    #[tokio::test]
    async fn test_failed_first_fetch_is_absent() {
        let transport = ScriptedTransport::new(vec![Err(FetchError::Timeout)]);
        let cache = cache_over(transport, Arc::new(MemoryStore::new()));

        let read = cache.read(30).await;

        assert_eq!(read.freshness, Freshness::Absent);
        assert!(read.nodes.is_empty());
        assert_eq!(read.failure, Some(FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_empty_page_is_a_valid_fresh_result() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::ok("<p>nobody keyed</p>")]);
        let cache = cache_over(transport, Arc::new(MemoryStore::new()));

        let read = cache.read(30).await;

        assert_eq!(read.freshness, Freshness::Fresh);
        assert!(read.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_expired_reads_share_one_refresh() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(PAGE_ONE),
            ScriptedTransport::ok(PAGE_TWO),
        ]);
        let cache = Arc::new(cache_over(transport.clone(), Arc::new(MemoryStore::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.read(60).await })
            })
            .collect();
        for handle in handles {
            let read = handle.await.unwrap();
            assert_eq!(read.nodes.len(), 1);
        }

        assert_eq!(transport.calls(), 1);
    }
}
