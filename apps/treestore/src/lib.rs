//! # TreeStore application library
//!
//! The adapters around `treestore-core`: the HTTP API, the command line and
//! the configuration they share. The `treestore` binary is a thin entry
//! point over this library so the integration tests can drive the router.

pub mod api;
pub mod cli;
pub mod config;
