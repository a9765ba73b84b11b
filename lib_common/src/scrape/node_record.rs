//! # Node Record
//!
//! One row of a scraped node table, normalized. Serialized with the field
//! names the browser client already reads (`node`, `callsign`, …).

use serde::{Deserialize, Serialize};

/// Activity marker, only set on records from the "currently keyed" feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Keyed,
}

/// A remote node as listed by the upstream site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Node id; non-empty and digits only.
    #[serde(rename = "node")]
    pub number: String,
    pub callsign: String,
    pub location: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
}

/// True for a non-empty, ASCII-digits-only string.
pub fn is_node_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
