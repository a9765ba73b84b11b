//! # Pipeline Settings
//!
//! The part of the application configuration the pipeline itself needs:
//! upstream locations, cache TTL, the two request policies and the column
//! layouts. Binaries build one of these from their own config layers.

use crate::retrieve::ky_http::FetchOptions;
use crate::scrape::ColumnSchema;
use serde::Deserialize;

pub const DEFAULT_KEYED_URL: &str = "https://stats.allstarlink.org/stats/keyed";
pub const DEFAULT_SEARCH_URL: &str = "https://www.allstarlink.org/nodelist/";
pub const DEFAULT_SERVICE_NAME: &str = "HyperMon API";
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 30;
/// Upper bound for a configured TTL: one day.
pub const MAX_CACHE_TTL_SECONDS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub keyed_url: String,
    /// Directory search page; the term goes in its `search` query parameter.
    pub search_url: String,
    pub cache_ttl_seconds: u64,
    /// Policy for scraping the public pages.
    pub scrape_options: FetchOptions,
    /// Policy for calls to the link-management service.
    pub proxy_options: FetchOptions,
    pub keyed_schema: ColumnSchema,
    pub directory_schema: ColumnSchema,
    pub service_name: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            keyed_url: DEFAULT_KEYED_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            scrape_options: FetchOptions::default(),
            proxy_options: FetchOptions {
                timeout_seconds: 10,
                ..FetchOptions::default()
            },
            keyed_schema: ColumnSchema::keyed(),
            directory_schema: ColumnSchema::directory(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

/// Request-policy knobs as they appear in a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOverrides {
    pub timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
    pub proxy_timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
    pub verify_tls: Option<bool>,
}

impl PipelineSettings {
    /// Applies request-policy overrides to both fetch policies. The proxy
    /// policy takes its own total timeout and shares everything else.
    pub fn apply_policy(&mut self, policy: &PolicyOverrides) {
        for options in [&mut self.scrape_options, &mut self.proxy_options] {
            if let Some(secs) = policy.connect_timeout_seconds {
                options.connect_timeout_seconds = secs.max(1);
            }
            if let Some(agent) = policy.user_agent.as_ref().filter(|a| !a.trim().is_empty()) {
                options.user_agent = agent.clone();
            }
            if let Some(verify) = policy.verify_tls {
                options.verify_tls = verify;
            }
        }
        if let Some(secs) = policy.timeout_seconds {
            self.scrape_options.timeout_seconds = secs.max(1);
        }
        if let Some(secs) = policy.proxy_timeout_seconds {
            self.proxy_options.timeout_seconds = secs.max(1);
        }
    }

    /// Sets the snapshot TTL, capped at [`MAX_CACHE_TTL_SECONDS`].
    pub fn set_cache_ttl(&mut self, ttl_seconds: u64) {
        self.cache_ttl_seconds = ttl_seconds.min(MAX_CACHE_TTL_SECONDS);
    }

    /// Directory search URL for `term`.
    pub fn search_url_for(&self, term: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(&self.search_url)?;
        url.query_pairs_mut().append_pair("search", term);
        Ok(url.into())
    }
}
