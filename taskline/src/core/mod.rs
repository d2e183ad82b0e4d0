//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifact;
pub mod context;
pub mod invariants;
pub mod keywords;
pub mod patterns;
pub mod permission;
pub mod retrieval;
pub mod scorecard;
pub mod state_machine;
pub mod types;
