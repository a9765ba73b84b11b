//! # Core Module
//!
//! The action dispatcher that turns an inbound request into one pipeline
//! operation and a uniform response envelope. The HTTP servers sit on top
//! of this and add nothing but transport.

/// Action routing and the response envelope.
pub mod dispatcher;

pub use dispatcher::{Action, Dispatcher, Envelope};
