//! # lib_common
//!
//! The fetch → parse → cache → proxy pipeline behind the HyperMon node
//! monitor. Each folder is a module gated behind a cargo feature of the same
//! name; `full` (the default) switches everything on.
//!
//! - **`retrieve`**: the single outbound HTTP `Fetcher`.
//! - **`scrape`**: HTML table extraction into `NodeRecord`s.
//! - **`connections`**: the single-key presence cache and its stores.
//! - **`linkctl`**: the proxy toward the link-management service.
//! - **`core`**: the action `Dispatcher` and its response envelope.
//! - **`configs`**: pipeline settings shared by every binary.
//! - **`loggers`**: tracing bootstrap.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Error taxonomy shared by every pipeline stage.
pub mod errors;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "scrape")]
pub mod scrape;

#[cfg(feature = "connections")]
pub mod connections;

#[cfg(feature = "linkctl")]
pub mod linkctl;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "configs")]
pub mod configs;

#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(all(test, feature = "retrieve"))]
pub(crate) mod test_support;

pub use errors::HyperMonError;
