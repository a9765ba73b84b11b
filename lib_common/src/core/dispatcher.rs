//! # Action Dispatcher
//!
//! The `Dispatcher` is the single entry point of the pipeline. It takes an
//! action name plus its string parameters, routes to exactly one operation
//! and hands back an [`Envelope`]: an HTTP status and a JSON body.
//!
//! ## Design Principles:
//!
//! 1.  **One envelope for everything**: every outcome, success or failure,
//!     is a JSON object with a `success` flag. Failures carry `error` and, for
//!     list actions, the empty list the client would otherwise iterate.
//!
//! 2.  **No leaks**: component errors are typed [`HyperMonError`] values and
//!     are converted here and nowhere else. Nothing a downstream component
//!     does can escape as a panic or an untyped error.
//!
//! 3.  **Routing only**: the dispatcher trims and checks parameters, then
//!     delegates. Caching, parsing and link commands live in their own
//!     components.
//!
//! | action            | backed by                               |
//! |-------------------|-----------------------------------------|
//! | `keyed-nodes`     | `PresenceCache`                         |
//! | `search-nodes`    | `Fetcher` + `TableParser`, not cached   |
//! | `node-info`       | directory search, exact match preferred |
//! | `get-connections` | `AllmonProxy::list_connections`         |
//! | `connect`         | `AllmonProxy::connect`                  |
//! | `disconnect`      | `AllmonProxy::disconnect`               |
//! | `health`          | static payload                          |

use crate::configs::PipelineSettings;
use crate::connections::{CacheStore, Freshness, PresenceCache};
use crate::errors::HyperMonError;
use crate::linkctl::AllmonProxy;
use crate::retrieve::ky_http::{Credentials, FetchError, Fetcher};
use crate::scrape::{NodeRecord, TableParser};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const FETCH_FAILED: &str = "Failed to fetch data from AllStarLink";

/// Every action the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    KeyedNodes,
    SearchNodes,
    NodeInfo,
    GetConnections,
    Connect,
    Disconnect,
    Health,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::KeyedNodes => "keyed-nodes",
            Action::SearchNodes => "search-nodes",
            Action::NodeInfo => "node-info",
            Action::GetConnections => "get-connections",
            Action::Connect => "connect",
            Action::Disconnect => "disconnect",
            Action::Health => "health",
        }
    }

    /// Name of the list a failure envelope must still carry, if any.
    fn empty_list_key(self) -> Option<&'static str> {
        match self {
            Action::KeyedNodes => Some("nodes"),
            Action::SearchNodes => Some("results"),
            Action::GetConnections => Some("connections"),
            _ => None,
        }
    }
}

impl FromStr for Action {
    type Err = HyperMonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "keyed-nodes" => Ok(Action::KeyedNodes),
            "search-nodes" => Ok(Action::SearchNodes),
            "node-info" => Ok(Action::NodeInfo),
            "get-connections" => Ok(Action::GetConnections),
            "connect" => Ok(Action::Connect),
            "disconnect" => Ok(Action::Disconnect),
            "health" => Ok(Action::Health),
            _ => Err(HyperMonError::InvalidAction),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Response Envelope
///
/// What the inbound surface sends back: a status code and a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status: u16,
    pub body: Value,
}

impl Envelope {
    fn success(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn failure(action: Option<Action>, err: &HyperMonError) -> Self {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("error".into(), Value::String(err.to_string()));
        if let Some(key) = action.and_then(Action::empty_list_key) {
            body.insert(key.into(), Value::Array(Vec::new()));
        }
        // get-connections fails in its success shape.
        if action == Some(Action::GetConnections) {
            body.insert("count".into(), Value::from(0));
        }
        Self {
            status: err.http_status(),
            body: Value::Object(body),
        }
    }

    pub fn is_success(&self) -> bool {
        self.body.get("success").and_then(Value::as_bool) == Some(true)
    }
}

/// Trimmed parameter, empty when absent.
fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(|v| v.trim()).unwrap_or("")
}

/// Untrimmed parameter, empty when absent. Credentials are passed on as sent.
fn raw_param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or("")
}

fn required<'a>(params: &'a HashMap<String, String>, key: &str, message: &str) -> Result<&'a str, HyperMonError> {
    match param(params, key) {
        "" => Err(HyperMonError::Validation(message.to_string())),
        value => Ok(value),
    }
}

fn scrape_failure(err: FetchError) -> HyperMonError {
    HyperMonError::Network {
        message: FETCH_FAILED.to_string(),
        status: err.status(),
    }
}

/// # Dispatcher
///
/// Owns one of each pipeline component. Cheap to share behind an `Arc`;
/// the only mutable state is inside the presence cache.
pub struct Dispatcher {
    settings: PipelineSettings,
    fetcher: Arc<Fetcher>,
    parser: Arc<TableParser>,
    presence: PresenceCache,
    proxy: AllmonProxy,
}

impl Dispatcher {
    /// Wires the pipeline on `fetcher`, keeping the keyed snapshot in `store`.
    pub fn new(settings: PipelineSettings, fetcher: Arc<Fetcher>, store: Arc<dyn CacheStore>) -> Self {
        let parser = Arc::new(TableParser::new());
        let presence = PresenceCache::new(
            Arc::clone(&fetcher),
            Arc::clone(&parser),
            store,
            settings.keyed_url.clone(),
            settings.scrape_options.clone(),
            settings.keyed_schema.clone(),
        );
        let proxy = AllmonProxy::new(Arc::clone(&fetcher), settings.proxy_options.clone());
        Self {
            settings,
            fetcher,
            parser,
            presence,
            proxy,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs `action` and wraps the outcome. Never fails.
    pub async fn dispatch(&self, action: &str, params: &HashMap<String, String>) -> Envelope {
        let action = match action.parse::<Action>() {
            Ok(action) => action,
            Err(err) => {
                tracing::debug!(action, "unrecognized action");
                return Envelope::failure(None, &err);
            }
        };

        let outcome = match action {
            Action::KeyedNodes => self.keyed_nodes().await,
            Action::SearchNodes => self.search_nodes(params).await,
            Action::NodeInfo => self.node_info(params).await,
            Action::GetConnections => self.get_connections(params).await,
            Action::Connect | Action::Disconnect => self.link_command(action, params).await,
            Action::Health => Ok(self.health()),
        };

        match outcome {
            Ok(body) => Envelope::success(body),
            Err(err) => {
                tracing::warn!(%action, kind = err.kind(), error = %err, "action failed");
                Envelope::failure(Some(action), &err)
            }
        }
    }

    async fn keyed_nodes(&self) -> Result<Value, HyperMonError> {
        let read = self.presence.read(self.settings.cache_ttl_seconds).await;

        match read.freshness {
            Freshness::Absent => Err(read
                .failure
                .map(scrape_failure)
                .unwrap_or_else(|| HyperMonError::Network {
                    message: FETCH_FAILED.to_string(),
                    status: None,
                })),
            freshness => {
                let mut body = json!({
                    "success": true,
                    "count": read.nodes.len(),
                    "nodes": read.nodes,
                    "cached": read.cached,
                });
                if freshness == Freshness::Stale {
                    body["stale"] = Value::Bool(true);
                }
                Ok(body)
            }
        }
    }

    /// Uncached directory lookup, shared by `search-nodes` and `node-info`.
    pub async fn search_directory(&self, term: &str) -> Result<Vec<NodeRecord>, HyperMonError> {
        let url = self.settings.search_url_for(term).map_err(|e| HyperMonError::Network {
            message: format!("Invalid search URL: {e}"),
            status: None,
        })?;
        let html = self
            .fetcher
            .fetch(&url, &self.settings.scrape_options)
            .await
            .map_err(scrape_failure)?;
        Ok(self.parser.parse_nodes(&html, &self.settings.directory_schema))
    }

    async fn search_nodes(&self, params: &HashMap<String, String>) -> Result<Value, HyperMonError> {
        let term = required(params, "q", "Search term required")?;
        let results = self.search_directory(term).await?;
        Ok(json!({
            "success": true,
            "count": results.len(),
            "results": results,
            "search_term": term,
        }))
    }

    async fn node_info(&self, params: &HashMap<String, String>) -> Result<Value, HyperMonError> {
        let number = required(params, "node", "Node number required")?;
        let mut results = self.search_directory(number).await?;

        let index = results.iter().position(|n| n.number == number).unwrap_or(0);
        if index >= results.len() {
            return Err(HyperMonError::NotFound("Node not found".into()));
        }
        let node = results.swap_remove(index);
        Ok(json!({ "success": true, "node": node }))
    }

    async fn get_connections(&self, params: &HashMap<String, String>) -> Result<Value, HyperMonError> {
        let user = raw_param(params, "user");
        let pass = raw_param(params, "pass");
        let credentials = (!user.is_empty() || !pass.is_empty()).then(|| Credentials::new(user, pass));

        let listing = self
            .proxy
            .list_connections(param(params, "allmonUrl"), param(params, "node"), credentials.as_ref())
            .await?;

        let mut body = json!({
            "success": true,
            "count": listing.connections.len(),
            "connections": listing.connections,
        });
        if let Some(reason) = listing.unavailable {
            body["warning"] = Value::String(reason);
        }
        Ok(body)
    }

    async fn link_command(&self, action: Action, params: &HashMap<String, String>) -> Result<Value, HyperMonError> {
        let base = param(params, "allmonUrl");
        let node = param(params, "node");
        let remote = param(params, "remote");
        let credentials = Credentials::new(raw_param(params, "user"), raw_param(params, "pass"));

        let message = if action == Action::Connect {
            self.proxy.connect(base, node, remote, &credentials).await?
        } else {
            self.proxy.disconnect(base, node, remote, &credentials).await?
        };
        Ok(json!({ "success": true, "message": message }))
    }

    fn health(&self) -> Value {
        json!({
            "status": "healthy",
            "service": self.settings.service_name,
            "success": true,
            "version": env!("CARGO_PKG_VERSION"),
        })
    }
}
