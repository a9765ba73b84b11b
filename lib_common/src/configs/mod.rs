//! # Configuration Modules
//!
//! Settings the pipeline is assembled from.

/// Upstream locations, TTL, request policies and column layouts.
pub mod config_app;

pub use config_app::{PipelineSettings, PolicyOverrides, MAX_CACHE_TTL_SECONDS};
