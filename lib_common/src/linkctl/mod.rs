//! # Link Control Module
//!
//! Talks to the local link-management service on behalf of the caller.

pub mod allmon;

pub use allmon::{AllmonProxy, ConnectionListing, ConnectionRecord};
