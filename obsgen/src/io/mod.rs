//! I/O helpers for planner and extractor commands.

pub mod compiler;
pub mod config;
pub mod extractor;
pub mod layout;
pub mod process;
pub mod prompt;
pub mod sources;
pub mod task_store;
