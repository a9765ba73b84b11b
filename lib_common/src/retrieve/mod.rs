//! # Data Retrieval Module
//!
//! Outbound HTTP for the whole crate. Scrapes of the public statistics site
//! and calls to the link-management service both go through the same
//! `Fetcher`, so timeout, TLS and user-agent policy is declared once.

/// The `Fetcher`, its options, and the pluggable `Transport`.
pub mod ky_http;

pub use ky_http::{Credentials, FetchError, FetchOptions, Fetcher, RawResponse, Transport};
