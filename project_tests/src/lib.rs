//! Test support for the workspace integration tests: a scripted upstream
//! that plays both the public statistics site and an AllMon link service,
//! plus helpers to wire a `Dispatcher` against it.

use lib_common::configs::PipelineSettings;
use lib_common::connections::MemoryStore;
use lib_common::core::Dispatcher;
use lib_common::retrieve::{FetchOptions, Fetcher};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

pub const KEYED_PAGE: &str = r#"<html><body>
<table class="keyed">
  <tr><th>Node</th><th>Callsign</th><th>Location</th><th>Info</th></tr>
  <tr><td><a href="/stats/546">546</a></td><td>W1ABC</td><td>City,ST</td><td>5 connections</td></tr>
  <tr><td>2000</td><td>K2XYZ</td><td>Albany, NY</td><td>Hub &amp; repeater</td></tr>
  <tr><td>offline</td><td>N0NE</td><td>-</td><td>-</td></tr>
</table>
</body></html>"#;

pub const DIRECTORY_PAGE: &str = r#"<table>
  <tr><th>Node</th><th>Callsign</th><th>Description</th><th>Location</th></tr>
  <tr><td>27339</td><td>W1AW</td><td>ARRL Hub, 12 links</td><td>Newington, CT</td></tr>
  <tr><td>2733</td><td>W1AW</td><td>Repeater</td><td>Hartford, CT</td></tr>
</table>"#;

pub const ALLMON_NODE_DOC: &str =
    r#"{"1999":{"links":{"2000":{"callsign":"K2XYZ","info":"Transceive"},"3001":null}}}"#;

/// One request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    /// Path plus query, e.g. `/link.php?node=1999&link=2000`.
    pub target: String,
    /// Raw request head.
    pub head: String,
}

/// A canned upstream on `127.0.0.1:<random>`.
///
/// Routes by path: `/stats/keyed`, `/nodelist/`, `/api/nodes/..` and
/// `/link.php`. The keyed page status can be changed at runtime to
/// simulate an outage.
pub struct MockUpstream {
    port: u16,
    keyed_status: Arc<AtomicU16>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

fn respond(target: &str, keyed_status: u16) -> (u16, &'static str, &'static str) {
    let path = target.split('?').next().unwrap_or("");
    match path {
        "/stats/keyed" if keyed_status == 200 => (200, "text/html", KEYED_PAGE),
        "/stats/keyed" => (keyed_status, "text/plain", "unavailable"),
        "/nodelist/" => (200, "text/html", DIRECTORY_PAGE),
        "/api/nodes/1999" => (200, "application/json", ALLMON_NODE_DOC),
        "/link.php" if target.contains("node=1999") => (200, "text/plain", "OK"),
        "/link.php" => (403, "text/plain", "Forbidden"),
        _ => (404, "text/plain", "Not Found"),
    }
}

impl MockUpstream {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
        let port = listener.local_addr().expect("local addr").port();
        let keyed_status = Arc::new(AtomicU16::new(200));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let status = Arc::clone(&keyed_status);
        let log = Arc::clone(&seen);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };

                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&head).to_string();
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (code, content_type, body) = respond(&target, status.load(Ordering::SeqCst));
                log.lock().expect("request log").push(SeenRequest { target, head });

                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    code,
                    content_type,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self {
            port,
            keyed_status,
            seen,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn set_keyed_status(&self, status: u16) {
        self.keyed_status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("request log").clone()
    }

    /// Requests whose path starts with `prefix`.
    pub fn hits(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.target.starts_with(prefix))
            .count()
    }

    /// Pipeline settings pointing both scraped feeds at this upstream.
    pub fn settings(&self, ttl_seconds: u64) -> PipelineSettings {
        let quick = FetchOptions {
            timeout_seconds: 3,
            connect_timeout_seconds: 1,
            ..FetchOptions::default()
        };
        PipelineSettings {
            keyed_url: self.url("/stats/keyed"),
            search_url: self.url("/nodelist/"),
            cache_ttl_seconds: ttl_seconds,
            scrape_options: quick.clone(),
            proxy_options: quick,
            ..PipelineSettings::default()
        }
    }

    /// A dispatcher on the real HTTP fetcher and an in-memory cache.
    pub fn dispatcher(&self, ttl_seconds: u64) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            self.settings(ttl_seconds),
            Arc::new(Fetcher::new()),
            Arc::new(MemoryStore::new()),
        ))
    }
}

/// Owned query-parameter map from string pairs.
pub fn params(pairs: &[(&str, &str)]) -> std::collections::HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
