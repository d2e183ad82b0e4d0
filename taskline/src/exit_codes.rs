//! Stable exit codes for taskline CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid layout, config or arguments, or another unexpected error.
pub const INVALID: i32 = 1;
/// `taskline run` failed; nothing was persisted.
pub const RUN_FAILED: i32 = 2;
/// `taskline show` found no artifact for the run id.
pub const NOT_FOUND: i32 = 3;
