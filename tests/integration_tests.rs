//! Main entry point for integration tests
//!
//! Run with: `cargo test --test integration_tests`
//!
//! The `common` module is loaded via `#[path]` in `integration/mod.rs` so it
//! is compiled once.

mod integration;

pub use integration::*;
