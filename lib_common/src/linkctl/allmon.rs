//! # AllMon Link Proxy
//!
//! Forwards link listing and connect/disconnect commands to an AllMon3-style
//! link-management service. Credentials travel with each call and are
//! never kept.
//!
//! Endpoints used, relative to the caller-supplied base URL:
//! - `GET {base}/api/nodes/{node}` for the node's current links (JSON).
//! - `GET {base}/link.php?node=..&link=..` to establish a link.
//! - `GET {base}/link.php?node=..&unlink=..` to tear one down.

use crate::errors::HyperMonError;
use crate::retrieve::ky_http::{Credentials, FetchOptions, Fetcher};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// One active link of a local node, as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub node: String,
    pub callsign: String,
    pub info: String,
}

/// Result of [`AllmonProxy::list_connections`].
///
/// Upstream failures do not surface as errors here: the list is empty and
/// `unavailable` says why, which keeps "no links" and "could not ask"
/// apart for callers that care.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionListing {
    pub connections: Vec<ConnectionRecord>,
    pub unavailable: Option<String>,
}

impl ConnectionListing {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            connections: Vec::new(),
            unavailable: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkCommand {
    Link,
    Unlink,
}

impl LinkCommand {
    fn query_key(self) -> &'static str {
        match self {
            LinkCommand::Link => "link",
            LinkCommand::Unlink => "unlink",
        }
    }

    fn done_message(self, node: &str, remote: &str) -> String {
        match self {
            LinkCommand::Link => format!("Node {node} connected to {remote}"),
            LinkCommand::Unlink => format!("Node {node} disconnected from {remote}"),
        }
    }
}

/// Trims the base URL, drops one trailing `/` and checks it is http(s).
fn normalize_base(base_url: &str) -> Result<Url, HyperMonError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(HyperMonError::Validation("AllMon URL required".into()));
    }
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

    let url = Url::parse(trimmed)
        .map_err(|e| HyperMonError::Validation(format!("Invalid AllMon URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(HyperMonError::Validation(
            "AllMon URL must use http or https".into(),
        ));
    }
    Ok(url)
}

/// Appends path segments to `base`, replacing an empty trailing segment.
fn join_segments(mut base: Url, segments: &[&str]) -> Result<Url, HyperMonError> {
    base.path_segments_mut()
        .map_err(|_| HyperMonError::Validation("Invalid AllMon URL".into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(base)
}

fn required<'a>(value: &'a str, message: &str) -> Result<&'a str, HyperMonError> {
    let value = value.trim();
    if value.is_empty() {
        Err(HyperMonError::Validation(message.to_string()))
    } else {
        Ok(value)
    }
}

/// Text of a JSON scalar; `None` for null, arrays and objects.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_field(entry: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| entry.get(*k))
        .find_map(scalar_text)
        .filter(|s| !s.is_empty())
}

/// Maps one link entry. `key` is the map key when links come as an object.
fn connection_from(key: Option<&str>, entry: &Value) -> Option<ConnectionRecord> {
    match entry {
        Value::Object(fields) => {
            let node = first_field(fields, &["node", "name", "id"])
                .or_else(|| key.map(str::to_string))?;
            Some(ConnectionRecord {
                node,
                callsign: first_field(fields, &["callsign", "call"]).unwrap_or_default(),
                info: first_field(fields, &["info", "description", "desc"]).unwrap_or_default(),
            })
        }
        Value::Null => key.map(|k| ConnectionRecord {
            node: k.to_string(),
            ..ConnectionRecord::default()
        }),
        scalar => {
            let node = scalar_text(scalar).filter(|s| !s.is_empty())?;
            Some(ConnectionRecord {
                node,
                ..ConnectionRecord::default()
            })
        }
    }
}

/// Finds the `links` collection, either at the top level or one level
/// down under the node's own key.
fn find_links(doc: &Value) -> Option<&Value> {
    let obj = doc.as_object()?;
    obj.get("links")
        .or_else(|| obj.values().find_map(|v| v.get("links")))
}

/// Extracts every link of a node-info document.
pub fn connections_from_document(doc: &Value) -> Vec<ConnectionRecord> {
    match find_links(doc) {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| connection_from(None, entry))
            .collect(),
        Some(Value::Object(entries)) => entries
            .iter()
            .filter_map(|(key, entry)| connection_from(Some(key), entry))
            .collect(),
        _ => Vec::new(),
    }
}

/// # AllMon Proxy
///
/// Stateless; safe to share across requests.
#[derive(Clone)]
pub struct AllmonProxy {
    fetcher: Arc<Fetcher>,
    options: FetchOptions,
}

impl AllmonProxy {
    pub fn new(fetcher: Arc<Fetcher>, options: FetchOptions) -> Self {
        Self { fetcher, options }
    }

    /// Lists the active links of `node`.
    ///
    /// # Errors
    /// Only `Validation` for a missing/invalid base URL or node. Any upstream
    /// failure yields an empty listing with a reason instead.
    pub async fn list_connections(
        &self,
        base_url: &str,
        node: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ConnectionListing, HyperMonError> {
        let base = normalize_base(base_url)?;
        let node = required(node, "Node number required")?;
        let url = join_segments(base, &["api", "nodes", node])?;

        let auth = credentials.filter(|c| c.is_complete()).cloned();
        let options = self.options.with_basic_auth(auth);

        let response = match self.fetcher.request(url.as_str(), &options).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(node, error = %e, "link listing unavailable");
                return Ok(ConnectionListing::unavailable(e.to_string()));
            }
        };
        if response.status != 200 {
            tracing::warn!(node, status = response.status, "link listing rejected");
            return Ok(ConnectionListing::unavailable(format!(
                "link service answered HTTP {}",
                response.status
            )));
        }

        match serde_json::from_str::<Value>(&response.body) {
            Ok(doc) => {
                let connections = connections_from_document(&doc);
                tracing::debug!(node, count = connections.len(), "link listing received");
                Ok(ConnectionListing {
                    connections,
                    unavailable: None,
                })
            }
            Err(e) => {
                tracing::warn!(node, error = %e, "link listing was not JSON");
                Ok(ConnectionListing::unavailable("link service returned invalid JSON"))
            }
        }
    }

    /// Links `node` to `remote`.
    pub async fn connect(
        &self,
        base_url: &str,
        node: &str,
        remote: &str,
        credentials: &Credentials,
    ) -> Result<String, HyperMonError> {
        self.command(LinkCommand::Link, base_url, node, remote, credentials)
            .await
    }

    /// Drops the link between `node` and `remote`.
    pub async fn disconnect(
        &self,
        base_url: &str,
        node: &str,
        remote: &str,
        credentials: &Credentials,
    ) -> Result<String, HyperMonError> {
        self.command(LinkCommand::Unlink, base_url, node, remote, credentials)
            .await
    }

    async fn command(
        &self,
        command: LinkCommand,
        base_url: &str,
        node: &str,
        remote: &str,
        credentials: &Credentials,
    ) -> Result<String, HyperMonError> {
        let node = required(node, "Node number required")?;
        let remote = required(remote, "Remote node required")?;
        if !credentials.is_complete() {
            return Err(HyperMonError::Validation(
                "Username and password required".into(),
            ));
        }
        let base = normalize_base(base_url)?;

        let mut url = join_segments(base, &["link.php"])?;
        url.query_pairs_mut()
            .append_pair("node", node)
            .append_pair(command.query_key(), remote);

        let options = self.options.with_basic_auth(Some(credentials.clone()));
        let response = self.fetcher.request(url.as_str(), &options).await?;

        if response.status == 200 {
            tracing::info!(node, remote, command = command.query_key(), "link command accepted");
            Ok(command.done_message(node, remote))
        } else {
            tracing::warn!(node, remote, command = command.query_key(), status = response.status, "link command rejected");
            Err(HyperMonError::Upstream {
                message: "Link command rejected".into(),
                status: response.status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieve::ky_http::FetchError;
    use crate::test_support::{MockServer, ScriptedTransport};
    use serde_json::json;

    fn proxy() -> AllmonProxy {
        AllmonProxy::new(
            Arc::new(Fetcher::new()),
            FetchOptions {
                timeout_seconds: 2,
                connect_timeout_seconds: 1,
                ..FetchOptions::default()
            },
        )
    }

    fn creds() -> Credentials {
        Credentials::new("admin", "secret")
    }

    #[test]
    fn test_links_as_array_of_mixed_entries() {
        let doc = json!({
            "links": [
                "2000",
                3001,
                {"node": "4000", "callsign": "W1AW", "info": "Newington, CT"},
                {"callsign": "nobody"},
                ""
            ]
        });
        let links = connections_from_document(&doc);
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].node, "2000");
        assert_eq!(links[1].node, "3001");
        assert_eq!(
            links[2],
            ConnectionRecord {
                node: "4000".into(),
                callsign: "W1AW".into(),
                info: "Newington, CT".into(),
            }
        );
    }

    #[test]
    fn test_links_as_map_keyed_by_node() {
        let doc = json!({
            "1999": {
                "links": {
                    "2000": {"callsign": "K1ABC", "description": "Hub"},
                    "2001": null
                }
            }
        });
        let mut links = connections_from_document(&doc);
        links.sort_by(|a, b| a.node.cmp(&b.node));
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].callsign, "K1ABC");
        assert_eq!(links[0].info, "Hub");
        assert_eq!(links[1].node, "2001");
    }

    #[test]
    fn test_document_without_links_is_empty() {
        assert!(connections_from_document(&json!({"status": "ok"})).is_empty());
        assert!(connections_from_document(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_base_url_normalization() {
        let url = normalize_base(" http://allmon.local/allmon3/ ").unwrap();
        let url = join_segments(url, &["api", "nodes", "1999"]).unwrap();
        assert_eq!(url.as_str(), "http://allmon.local/allmon3/api/nodes/1999");

        let url = join_segments(normalize_base("http://allmon.local").unwrap(), &["link.php"]).unwrap();
        assert_eq!(url.as_str(), "http://allmon.local/link.php");

        assert!(normalize_base("").is_err());
        assert!(normalize_base("ftp://allmon.local").is_err());
        assert!(normalize_base("not a url").is_err());
    }

    #[tokio::test]
    async fn test_list_connections_reads_node_endpoint() {
        let server = MockServer::start(|_| {
            (200, r#"{"links":[{"node":"2000","callsign":"K1ABC","info":"RX"}]}"#.to_string())
        });
        let listing = proxy()
            .list_connections(&server.url("/"), "1999", Some(&creds()))
            .await
            .unwrap();

        assert_eq!(listing.connections.len(), 1);
        assert_eq!(listing.unavailable, None);
        let head = &server.requests()[0];
        assert!(head.starts_with("GET /api/nodes/1999 "));
        assert!(head.contains("YWRtaW46c2VjcmV0"));
    }

    #[tokio::test]
    async fn test_list_connections_soft_fails_on_rejection() {
        let server = MockServer::start(|_| (401, "denied".to_string()));
        let listing = proxy()
            .list_connections(&server.url(""), "1999", None)
            .await
            .unwrap();

        assert!(listing.connections.is_empty());
        assert_eq!(listing.unavailable.as_deref(), Some("link service answered HTTP 401"));
    }

    #[tokio::test]
    async fn test_list_connections_soft_fails_on_bad_json_and_transport() {
        let server = MockServer::start(|_| (200, "<html>login</html>".to_string()));
        let listing = proxy().list_connections(&server.url(""), "1999", None).await.unwrap();
        assert!(listing.connections.is_empty());
        assert!(listing.unavailable.is_some());

        let transport = ScriptedTransport::new(vec![Err(FetchError::Timeout)]);
        let proxy = AllmonProxy::new(Arc::new(Fetcher::with_transport(transport)), FetchOptions::default());
        let listing = proxy.list_connections("http://allmon.local", "1999", None).await.unwrap();
        assert!(listing.connections.is_empty());
        assert!(listing.unavailable.is_some());
    }

    #[tokio::test]
    async fn test_commands_validate_before_any_network_call() {
        let transport = ScriptedTransport::new(vec![]);
        let proxy = AllmonProxy::new(
            Arc::new(Fetcher::with_transport(transport.clone())),
            FetchOptions::default(),
        );
        let base = "http://allmon.local";

        let cases = [
            ("", "2000", creds()),
            ("1999", " ", creds()),
            ("1999", "2000", Credentials::new("", "secret")),
            ("1999", "2000", Credentials::new("admin", "")),
        ];
        for (node, remote, c) in cases {
            let err = proxy.connect(base, node, remote, &c).await.unwrap_err();
            assert_eq!(err.kind(), "validation");
            let err = proxy.disconnect(base, node, remote, &c).await.unwrap_err();
            assert_eq!(err.kind(), "validation");
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_issue_link_commands() {
        let server = MockServer::start(|_| (200, "OK".to_string()));
        let base = server.url("/");

        let msg = proxy().connect(&base, "1999", "2000", &creds()).await.unwrap();
        assert_eq!(msg, "Node 1999 connected to 2000");
        let msg = proxy().disconnect(&base, "1999", "2000", &creds()).await.unwrap();
        assert_eq!(msg, "Node 1999 disconnected from 2000");

        let heads = server.requests();
        assert!(heads[0].starts_with("GET /link.php?node=1999&link=2000 "));
        assert!(heads[1].starts_with("GET /link.php?node=1999&unlink=2000 "));
        assert!(heads.iter().all(|h| h.contains("YWRtaW46c2VjcmV0")));
    }

    #[tokio::test]
    async fn test_rejected_command_is_upstream_error() {
        let server = MockServer::start(|_| (403, "forbidden".to_string()));
        let err = proxy()
            .connect(&server.url(""), "1999", "2000", &creds())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HyperMonError::Upstream {
                message: "Link command rejected".into(),
                status: 403,
            }
        );
    }
}
