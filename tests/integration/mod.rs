//! Integration tests for tuiscope
//!
//! These tests drive the collector end to end: instrumentation into the
//! store, export and import across stores, and the command line tool.

#[path = "../common/mod.rs"]
pub mod common;

pub mod checkpoint_chain;
pub mod cli;
pub mod file_export;
pub mod instrumentation_flow;
