//! # VaxTrax Application Library
//!
//! HTTP API, CLI and configuration for the VaxTrax custody server. The
//! binary in `main.rs` is a thin wrapper; integration tests drive the router
//! through this crate.

pub mod api;
pub mod cli;
pub mod config;
