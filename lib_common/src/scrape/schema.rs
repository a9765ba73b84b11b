//! # Column Schemas
//!
//! The keyed feed and the directory search page lay their tables out
//! differently. A [`ColumnSchema`] names, per logical field, which extracted
//! cell index feeds it, so the parser never hard-codes a layout.

use super::node_record::NodeStatus;
use serde::{Deserialize, Serialize};

/// Where each `NodeRecord` field comes from in a table row.
///
/// Indexes count cells from 0. A field whose index is `None`, or points past
/// the end of a row, is left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    /// Label used in logs.
    pub name: String,
    /// Cell holding the node number; rows where it is not numeric are dropped.
    pub number: usize,
    pub callsign: Option<usize>,
    pub location: Option<usize>,
    pub description: Option<usize>,
    /// Cell scanned for "`<digits>` connection(s)/link(s)".
    pub connections: Option<usize>,
    /// Rows with fewer cells are skipped.
    pub min_cells: usize,
    /// Stamped on every record parsed with this schema.
    #[serde(default)]
    pub status: Option<NodeStatus>,
}

impl ColumnSchema {
    /// `stats.allstarlink.org/stats/keyed`: Node | Callsign | Location | Description.
    /// The description column carries the connection count.
    pub fn keyed() -> Self {
        Self {
            name: "keyed".to_string(),
            number: 0,
            callsign: Some(1),
            location: Some(2),
            description: Some(3),
            connections: Some(3),
            min_cells: 2,
            status: Some(NodeStatus::Keyed),
        }
    }

    /// `allstarlink.org/nodelist/?search=`: Node | Callsign | Description | Location.
    pub fn directory() -> Self {
        Self {
            name: "directory".to_string(),
            number: 0,
            callsign: Some(1),
            location: Some(3),
            description: Some(2),
            connections: Some(2),
            min_cells: 2,
            status: None,
        }
    }
}
