//! # Rombel application library
//!
//! The CLI, HTTP adapter and configuration of the `rombel` binary, exposed
//! as a library so integration tests can drive the router directly.

pub mod api;
pub mod cli;
pub mod config;
pub mod storage;
