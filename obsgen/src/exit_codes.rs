//! Stable exit codes for obsgen CLI commands.

/// Command succeeded and every expected artifact was saved.
pub const OK: i32 = 0;
/// Command failed due to invalid config, an invalid task graph, unreadable
/// input or other errors.
pub const INVALID: i32 = 1;
/// Extraction saved artifacts but fewer than expected (truncation warning).
pub const PARTIAL: i32 = 2;
/// Extraction saved no artifacts.
pub const EMPTY: i32 = 3;
