//! # Scrape Module
//!
//! Reading the upstream statistics pages. Everything here is pure: HTML in,
//! `NodeRecord`s out, no I/O and no error path.

/// The normalized node record and its status marker.
pub mod node_record;
/// Per-feed column layouts.
pub mod schema;
/// Strategy-ordered table extraction.
pub mod table_parser;

pub use node_record::{NodeRecord, NodeStatus};
pub use schema::ColumnSchema;
pub use table_parser::TableParser;
