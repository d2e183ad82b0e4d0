//! Staged agent pipeline with a permission policy and a file-backed memory.
//!
//! A request flows through eleven fixed stages, from observation to
//! reflection, and produces one validated [`core::artifact::RunArtifact`].
//! The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (keywords, permissions, scoring,
//!   invariants, the run state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (memory store, config, providers,
//!   prompts, child processes). Isolated to enable mocking in tests.
//!
//! [`agents`] implements the stages, [`pipeline`] drives them in order,
//! [`validate`] gates every output, and [`session`] carries the feedback
//! loops between runs.

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
