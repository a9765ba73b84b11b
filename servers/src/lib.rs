//! # servers
//!
//! The HyperMon HTTP surface: configuration layering, the axum router and
//! the wiring from configuration to a shared `Dispatcher`. The binaries in
//! this crate are thin `main` functions over this library.

pub mod hypermon_logic;
