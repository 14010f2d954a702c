//! Observability artifact planner and extractor.
//!
//! This crate turns a service taxonomy into a dependency graph of artifact
//! generation tasks, and turns each task's free-form output back into
//! per-service artifact files. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (delimiter scanning, sanitizing,
//!   routing, graph building). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, data sources, task
//!   state, compiler subprocesses). Isolated to enable test doubles.
//!
//! Orchestration modules ([`plan`], [`extract`]) coordinate core logic with
//! I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod extract;
pub mod io;
pub mod logging;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
