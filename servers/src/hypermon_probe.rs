//! Checks that the keyed-nodes page is reachable and still parses.
//!
//! Prints the HTTP outcome, body size, a short text preview and the number
//! of node records found. Exits non-zero when the page cannot be used.

use anyhow::{bail, Result};
use lib_common::retrieve::{ky_http, Fetcher};
use lib_common::scrape::table_parser::clean_cell;
use lib_common::scrape::TableParser;
use servers::hypermon_logic::config;
use tracing_subscriber::EnvFilter;

const PREVIEW_CHARS: usize = 200;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let settings = config.pipeline_settings();
    let fetcher = Fetcher::new();

    println!("Probing {}", settings.keyed_url);
    let response = fetcher
        .request(&settings.keyed_url, &settings.scrape_options)
        .await?;

    println!("HTTP status: {}", response.status);
    println!("Body length: {} bytes", response.body.len());

    let preview: String = clean_cell(&response.body).chars().take(PREVIEW_CHARS).collect();
    println!("Preview: {}", preview);

    if let Err(e) = ky_http::check(&response) {
        bail!("{}", e);
    }

    let nodes = TableParser::new().parse_nodes(&response.body, &settings.keyed_schema);
    println!("Parsed nodes: {}", nodes.len());
    for node in nodes.iter().take(5) {
        println!("  {} {} {}", node.number, node.callsign, node.location);
    }

    Ok(())
}
