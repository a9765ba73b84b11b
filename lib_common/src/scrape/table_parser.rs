//! # Table Parser
//!
//! Turns a scraped HTML page into `NodeRecord`s. The page is not ours and
//! its markup drifts, so extraction is a short ordered list of strategies:
//!
//! 1. [`TagScanStrategy`] walks the markup tag by tag and only reads rows
//!    that sit inside a `<table>`. It gives up on markup it cannot tokenize
//!    (unterminated tags, comments or scripts).
//! 2. [`RegexScanStrategy`] looks for row and cell openings anywhere in the
//!    raw text and tolerates missing closing tags.
//!
//! The first strategy that yields at least one record wins. Parsing never
//! fails: total failure is an empty list.

use super::node_record::{is_node_number, NodeRecord};
use super::schema::ColumnSchema;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static CONNECTIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:connection|link)").expect("static regex"));
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("static regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static ROW_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<tr\b[^>]*>").expect("static regex"));
static ROW_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</tr\s*>").expect("static regex"));
static CELL_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<t[dh]\b[^>]*>").expect("static regex"));
static CELL_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</t[dh]\s*>").expect("static regex"));

/// Count from a "`<digits>` connection(s)" / "`<digits>` link(s)" phrase.
pub fn connections_in(text: &str) -> Option<u32> {
    CONNECTIONS_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Decodes the handful of entities the upstream pages use, plus numeric ones.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ if name.starts_with('#') => name[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

/// Collapses whitespace runs to one space and trims.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cell inner HTML to plain text: markup stripped, entities decoded, trimmed.
pub fn clean_cell(inner_html: &str) -> String {
    let text = TAG_RE.replace_all(inner_html, " ");
    normalize_ws(&decode_entities(&text))
}

/// Maps raw rows to records: skips the header row, applies the schema and
/// drops rows without a numeric node number.
pub fn records_from_rows(rows: Vec<Vec<String>>, schema: &ColumnSchema) -> Vec<NodeRecord> {
    let min_cells = schema.min_cells.max(schema.number + 1);
    let pick = |cells: &[String], idx: Option<usize>| {
        idx.and_then(|i| cells.get(i)).cloned().unwrap_or_default()
    };

    rows.into_iter()
        .skip(1)
        .filter(|cells| cells.len() >= min_cells)
        .filter(|cells| is_node_number(&cells[schema.number]))
        .map(|cells| NodeRecord {
            number: cells[schema.number].clone(),
            callsign: pick(&cells, schema.callsign),
            location: pick(&cells, schema.location),
            description: pick(&cells, schema.description),
            connections_count: schema
                .connections
                .and_then(|i| cells.get(i))
                .and_then(|text| connections_in(text)),
            status: schema.status,
        })
        .collect()
}

/// One way of finding table rows in a page.
pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every row found, header included, as cleaned cell texts.
    fn rows(&self, html: &str) -> Vec<Vec<String>>;

    fn parse_nodes(&self, html: &str, schema: &ColumnSchema) -> Vec<NodeRecord> {
        records_from_rows(self.rows(html), schema)
    }
}

/// Structured strategy: a tag-level walk of the document.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagScanStrategy;

/// Accumulates rows while [`TagScanStrategy`] walks the tags.
#[derive(Default)]
struct RowBuilder {
    table_depth: usize,
    row: Option<Vec<String>>,
    cell: Option<String>,
    rows: Vec<Vec<String>>,
}

impl RowBuilder {
    fn text(&mut self, text: &str) {
        if let Some(cell) = self.cell.as_mut() {
            cell.push_str(text);
        }
    }

    fn end_cell(&mut self) {
        if let Some(raw) = self.cell.take() {
            if let Some(row) = self.row.as_mut() {
                row.push(normalize_ws(&decode_entities(&raw)));
            }
        }
    }

    fn end_row(&mut self) {
        self.end_cell();
        if let Some(row) = self.row.take() {
            self.rows.push(row);
        }
    }

    fn tag(&mut self, name: &str, closing: bool) {
        match (name, closing) {
            ("table", false) => self.table_depth += 1,
            ("table", true) => {
                self.end_row();
                self.table_depth = self.table_depth.saturating_sub(1);
            }
            _ if self.table_depth == 0 => {}
            ("tr", false) => {
                self.end_row();
                self.row = Some(Vec::new());
            }
            ("tr", true) => self.end_row(),
            ("td" | "th", false) if self.row.is_some() => {
                self.end_cell();
                self.cell = Some(String::new());
            }
            ("td" | "th", true) => self.end_cell(),
            ("br" | "p" | "div" | "li", _) => self.text(" "),
            _ => {}
        }
    }
}

/// Byte offset of the `>` closing the tag that opens at `lt`, skipping `>`
/// inside quoted attribute values.
fn tag_end(bytes: &[u8], lt: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &b) in bytes[lt + 1..].iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(lt + 1 + offset),
            (None, _) => {}
        }
    }
    None
}

impl TagScanStrategy {
    /// `None` when the markup cannot be tokenized.
    fn scan(html: &str) -> Option<Vec<Vec<String>>> {
        // ASCII lowercasing keeps byte offsets identical to `html`.
        let lower = html.to_ascii_lowercase();
        let bytes = html.as_bytes();
        let mut builder = RowBuilder::default();
        let mut pos = 0;

        while let Some(rel) = html[pos..].find('<') {
            let lt = pos + rel;
            builder.text(&html[pos..lt]);

            if lower[lt..].starts_with("<!--") {
                let end = lower[lt + 4..].find("-->")?;
                pos = lt + 4 + end + 3;
                continue;
            }

            let gt = tag_end(bytes, lt)?;
            let inner = &lower[lt + 1..gt];
            let closing = inner.starts_with('/');
            let name: String = inner
                .trim_start_matches('/')
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();

            if !closing && (name == "script" || name == "style") {
                let close = format!("</{}", name);
                let end = lower[gt..].find(&close)?;
                let close_gt = tag_end(bytes, gt + end)?;
                pos = close_gt + 1;
                continue;
            }

            builder.tag(&name, closing);
            pos = gt + 1;
        }

        builder.text(&html[pos..]);
        builder.end_row();
        Some(builder.rows)
    }
}

impl ParseStrategy for TagScanStrategy {
    fn name(&self) -> &'static str {
        "tag-scan"
    }

    fn rows(&self, html: &str) -> Vec<Vec<String>> {
        Self::scan(html).unwrap_or_else(|| {
            tracing::debug!("tag scan gave up on malformed markup");
            Vec::new()
        })
    }
}

/// Fallback strategy: row and cell boundaries located directly in the raw
/// text, closing tags optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexScanStrategy;

/// Text between each match of `open` and the next one (or the end).
fn segments_after<'a>(open: &Regex, text: &'a str) -> Vec<&'a str> {
    let spans: Vec<(usize, usize)> = open.find_iter(text).map(|m| (m.start(), m.end())).collect();
    spans
        .iter()
        .enumerate()
        .map(|(i, &(_, end))| {
            let stop = spans.get(i + 1).map_or(text.len(), |&(start, _)| start);
            &text[end..stop]
        })
        .collect()
}

/// `segment` up to the first match of `close`, if any.
fn cut_at<'a>(close: &Regex, segment: &'a str) -> &'a str {
    close.find(segment).map_or(segment, |m| &segment[..m.start()])
}

impl ParseStrategy for RegexScanStrategy {
    fn name(&self) -> &'static str {
        "regex-scan"
    }

    fn rows(&self, html: &str) -> Vec<Vec<String>> {
        segments_after(&ROW_OPEN_RE, html)
            .into_iter()
            .map(|row| cut_at(&ROW_CLOSE_RE, row))
            .map(|row| {
                segments_after(&CELL_OPEN_RE, row)
                    .into_iter()
                    .map(|cell| clean_cell(cut_at(&CELL_CLOSE_RE, cell)))
                    .collect()
            })
            .collect()
    }
}

/// # Table Parser
///
/// Tries each strategy in order and keeps the first non-empty result.
pub struct TableParser {
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Default for TableParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TableParser {
    /// Tag scan first, regex scan as fallback.
    pub fn new() -> Self {
        Self::with_strategies(vec![Box::new(TagScanStrategy), Box::new(RegexScanStrategy)])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ParseStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn parse_nodes(&self, html: &str, schema: &ColumnSchema) -> Vec<NodeRecord> {
        for strategy in &self.strategies {
            let records = strategy.parse_nodes(html, schema);
            if !records.is_empty() {
                tracing::debug!(
                    strategy = strategy.name(),
                    schema = %schema.name,
                    records = records.len(),
                    "parsed node table"
                );
                return records;
            }
            tracing::debug!(strategy = strategy.name(), schema = %schema.name, "strategy found no records");
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::node_record::NodeStatus;

    const KEYED_PAGE: &str = r#"
        <html><body>
        <table class="keyed">
          <tr><th>Node</th><th>Callsign</th><th>Location</th><th>Info</th></tr>
          <tr><td>546</td><td>W1ABC</td><td>City,ST</td><td>5 connections</td></tr>
          <tr><td> 2000 </td><td><a href="/n/2000">K2XYZ</a></td><td>Town &amp; Co</td><td>idle</td></tr>
          <tr><td>hub</td><td>N0PE</td><td>Nowhere</td><td>1 link</td></tr>
          <tr><td></td><td>N0NE</td><td>Nowhere</td><td></td></tr>
          <tr><td>3100</td><td>AB1CD</td><td>Far</td><td>2 Links</td></tr>
        </table>
        </body></html>"#;

    #[test]
    fn test_keyed_scenario_yields_one_keyed_record() {
        let html = "<table><tr><th>Node</th></tr><tr><td>546</td><td>W1ABC</td><td>City,ST</td><td>5 connections</td></tr></table>";
        let nodes = TableParser::new().parse_nodes(html, &ColumnSchema::keyed());

        assert_eq!(
            nodes,
            vec![NodeRecord {
                number: "546".into(),
                callsign: "W1ABC".into(),
                location: "City,ST".into(),
                description: "5 connections".into(),
                connections_count: Some(5),
                status: Some(NodeStatus::Keyed),
            }]
        );
    }

    #[test]
    fn test_rows_kept_in_order_and_invalid_numbers_dropped() {
        let nodes = TableParser::new().parse_nodes(KEYED_PAGE, &ColumnSchema::keyed());
        let numbers: Vec<&str> = nodes.iter().map(|n| n.number.as_str()).collect();

        assert_eq!(numbers, vec!["546", "2000", "3100"]);
        assert_eq!(nodes[1].callsign, "K2XYZ");
        assert_eq!(nodes[1].location, "Town & Co");
        assert_eq!(nodes[1].connections_count, None);
        assert_eq!(nodes[2].connections_count, Some(2));
    }

    #[test]
    fn test_both_strategies_drop_non_numeric_rows() {
        let schema = ColumnSchema::keyed();
        for strategy in [&TagScanStrategy as &dyn ParseStrategy, &RegexScanStrategy] {
            let nodes = strategy.parse_nodes(KEYED_PAGE, &schema);
            assert_eq!(nodes.len(), 3, "strategy {}", strategy.name());
            assert!(nodes.iter().all(|n| is_node_number(&n.number)));
        }
    }

    #[test]
    fn test_n_rows_give_n_records() {
        let mut html = String::from("<table><tr><th>Node</th><th>Call</th></tr>");
        for i in 0..25 {
            html.push_str(&format!("<tr><td>{}</td><td>CALL{}</td></tr>", 1000 + i, i));
        }
        html.push_str("</table>");

        let nodes = TableParser::new().parse_nodes(&html, &ColumnSchema::keyed());

        assert_eq!(nodes.len(), 25);
        assert_eq!(nodes[0].number, "1000");
        assert_eq!(nodes[24].callsign, "CALL24");
        assert_eq!(nodes[24].location, "");
    }

    #[test]
    fn test_single_cell_rows_are_skipped() {
        let html = "<table><tr><th>Node</th></tr><tr><td>546</td></tr><tr><td>547</td><td>K1A</td></tr></table>";
        let nodes = TableParser::new().parse_nodes(html, &ColumnSchema::keyed());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].number, "547");
    }

    #[test]
    fn test_tag_scan_ignores_rows_outside_tables() {
        let html = "<tr><th>Node</th></tr><tr><td>546</td><td>W1ABC</td></tr>";
        assert!(TagScanStrategy.rows(html).is_empty());

        // The regex fallback still finds them.
        let nodes = TableParser::new().parse_nodes(html, &ColumnSchema::keyed());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].callsign, "W1ABC");
    }

    #[test]
    fn test_malformed_markup_falls_back_to_regex() {
        let html = "<table><tr><th>Node</th></tr><tr><td>546</td><td>W1ABC</td></tr></table><div class=\"oops";
        assert!(TagScanStrategy.rows(html).is_empty());

        let nodes = TableParser::new().parse_nodes(html, &ColumnSchema::keyed());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].number, "546");
    }

    #[test]
    fn test_regex_scan_tolerates_missing_closing_tags() {
        let html = "<table><tr><th>Node<th>Call<tr><td>77<td>K7ZZ<td>Here<tr><td>78<td>K7YY</table>";
        let rows = RegexScanStrategy.rows(html);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["77", "K7ZZ", "Here"]);
        assert_eq!(rows[2], vec!["78", "K7YY"]);
    }

    #[test]
    fn test_tag_scan_skips_scripts_and_comments() {
        let html = r#"<table><tr><th>Node</th></tr>
            <!-- <tr><td>999</td><td>HIDDEN</td></tr> -->
            <script>var s = "<tr><td>998</td><td>JS</td></tr>";</script>
            <tr><td data-x="a>b">546</td><td>W1ABC</td></tr></table>"#;
        let nodes = TableParser::new().parse_nodes(html, &ColumnSchema::keyed());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].number, "546");
    }

    #[test]
    fn test_directory_schema_maps_other_columns() {
        let html = "<table><tr><th>Node</th><th>Call</th><th>Desc</th><th>Loc</th></tr>\
                    <tr><td>2560</td><td>W9XYZ</td><td>Hub, 12 connections</td><td>Chicago, IL</td></tr></table>";
        let nodes = TableParser::new().parse_nodes(html, &ColumnSchema::directory());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].location, "Chicago, IL");
        assert_eq!(nodes[0].description, "Hub, 12 connections");
        assert_eq!(nodes[0].connections_count, Some(12));
        assert_eq!(nodes[0].status, None);
    }

    #[test]
    fn test_garbage_yields_empty() {
        let parser = TableParser::new();
        assert!(parser.parse_nodes("", &ColumnSchema::keyed()).is_empty());
        assert!(parser.parse_nodes("not html at all <<<", &ColumnSchema::keyed()).is_empty());
        assert!(parser.parse_nodes("<table><tr><th>Only header</th></tr></table>", &ColumnSchema::keyed()).is_empty());
    }

    #[test]
    fn test_connections_pattern() {
        assert_eq!(connections_in("3 connections"), Some(3));
        assert_eq!(connections_in("Hub with 14 Links"), Some(14));
        assert_eq!(connections_in("1 connection"), Some(1));
        assert_eq!(connections_in("connections: 3"), None);
        assert_eq!(connections_in("idle"), None);
    }

    #[test]
    fn test_clean_cell_strips_markup_and_entities() {
        assert_eq!(clean_cell("  <b>W1&amp;ABC</b>\n <br/> x&#33;&#x41; "), "W1&ABC x!A");
        assert_eq!(clean_cell("&unknown; &lt;ok&gt;"), "&unknown; <ok>");
    }
}
