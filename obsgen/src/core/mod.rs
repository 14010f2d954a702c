//! Deterministic, pure logic shared by the planner and the extractor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod context;
pub mod delimiter;
pub mod graph;
pub mod invariants;
pub mod payload;
pub mod router;
pub mod sanitize;
pub mod task_id;
pub mod taxonomy;
pub mod types;
