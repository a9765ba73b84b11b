//! # Pipeline Errors
//!
//! Every component returns one of these instead of letting a transport or
//! parsing fault escape. The `Dispatcher` is the only place that turns them
//! into a response envelope.

use thiserror::Error;

/// The error taxonomy of the HyperMon pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HyperMonError {
    /// Missing or malformed input, detected before any network call.
    #[error("{0}")]
    Validation(String),

    /// Transport failure, timeout, or a non-2xx answer from a scrape target.
    /// `status` is `None` when no HTTP response was received at all.
    #[error("{message}")]
    Network {
        message: String,
        status: Option<u16>,
    },

    /// Non-200 answer from the link-management service on a control command.
    #[error("{message} (HTTP {status})")]
    Upstream { message: String, status: u16 },

    /// No matching record for a node lookup.
    #[error("{0}")]
    NotFound(String),

    /// Unrecognized action name.
    #[error("Invalid action")]
    InvalidAction,
}

impl HyperMonError {
    /// Short machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HyperMonError::Validation(_) => "validation",
            HyperMonError::Network { .. } => "network",
            HyperMonError::Upstream { .. } => "upstream",
            HyperMonError::NotFound(_) => "not_found",
            HyperMonError::InvalidAction => "invalid_action",
        }
    }

    /// HTTP status the inbound surface answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            HyperMonError::Validation(_) | HyperMonError::InvalidAction => 400,
            HyperMonError::NotFound(_) => 404,
            HyperMonError::Network { .. } | HyperMonError::Upstream { .. } => 502,
        }
    }
}

#[cfg(feature = "retrieve")]
impl From<crate::retrieve::ky_http::FetchError> for HyperMonError {
    fn from(err: crate::retrieve::ky_http::FetchError) -> Self {
        HyperMonError::Network {
            status: err.status(),
            message: err.to_string(),
        }
    }
}
