//! Shared test utilities for tuiscope
//!
//! - Deterministic IDs and timestamps
//! - Scripted UI sessions driven through an `Instrumentor`
//! - Hook doubles (recording and panicking hooks, collecting error sinks)

pub mod determinism;
pub mod fixtures;
