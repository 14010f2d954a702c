//! Shared deterministic types for planning and extraction.
//!
//! These types define stable contracts between core components and the I/O
//! layer. They hold data only; behavior lives in the modules that produce them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::router::ArtifactKind;

/// Task type as persisted in `task.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Epic,
    Task,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Epic => "epic",
            TaskType::Task => "task",
        }
    }
}

/// Artifact code plus the services a task is expected to cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskArtifactRequest {
    pub code: String,
    pub services: Vec<String>,
}

/// One node of the generated task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: String,
    pub title: String,
    pub task_type: TaskType,
    pub phase: u32,
    pub depends_on: Vec<String>,
    pub prompt: String,
    /// Set only in decomposed mode.
    pub service_name: Option<String>,
    /// Set only on artifact-producing tasks.
    pub artifact: Option<TaskArtifactRequest>,
}

/// Graph shape: one task per (tier, code) or one per (service, code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    #[default]
    Batched,
    Decomposed,
}

/// Why a whole task produced nothing without it being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The task id is not an `OB-<SCOPE>-<CODE>` artifact id.
    ForeignTaskId,
    UnknownArtifactCode,
    /// The payload was null or blank.
    EmptyOutput,
    /// No markers and the expected service count does not allow a fallback.
    NoDelimiters,
}

/// Why one delimited block was not saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TypeMismatch,
    UnsafeServiceName,
    EmptyContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBlock {
    pub declared_type: String,
    pub service: String,
    pub reason: SkipReason,
}

/// A saved or compiled artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedArtifact {
    pub service: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// A block that failed while being written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactFailure {
    pub service: String,
    pub message: String,
}

/// A parameter document that failed to compile into its final artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileFailureRecord {
    pub service: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TruncationWarning {
    pub expected: usize,
    pub saved: usize,
}

/// Outcome of extracting one task's output.
///
/// Data-shape problems land here as fields; only whole-task I/O failures are
/// reported as errors by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub task_id: String,
    pub kind: Option<ArtifactKind>,
    pub expected: usize,
    pub saved: Vec<SavedArtifact>,
    pub compiled: Vec<SavedArtifact>,
    pub skipped: Vec<SkippedBlock>,
    pub failures: Vec<ArtifactFailure>,
    pub compile_failures: Vec<CompileFailureRecord>,
    pub truncation: Option<TruncationWarning>,
    pub ignored: Option<IgnoreReason>,
}

impl ExtractionReport {
    pub fn new(task_id: &str, kind: Option<ArtifactKind>, expected: usize) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind,
            expected,
            saved: Vec::new(),
            compiled: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            compile_failures: Vec::new(),
            truncation: None,
            ignored: None,
        }
    }

    pub fn ignored(
        task_id: &str,
        kind: Option<ArtifactKind>,
        expected: usize,
        reason: IgnoreReason,
    ) -> Self {
        Self {
            ignored: Some(reason),
            ..Self::new(task_id, kind, expected)
        }
    }

    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }

    pub fn compiled_count(&self) -> usize {
        self.compiled.len()
    }

    /// Compiled count when compilation produced anything, else saved count.
    pub fn effective_count(&self) -> usize {
        if self.compiled_count() > 0 {
            self.compiled_count()
        } else {
            self.saved_count()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(service: &str, kind: ArtifactKind) -> SavedArtifact {
        SavedArtifact {
            service: service.to_string(),
            kind,
            path: PathBuf::from(format!("{service}.out")),
        }
    }

    #[test]
    fn effective_count_prefers_compiled() {
        let mut report =
            ExtractionReport::new("OB-CRIT-PARAMS", Some(ArtifactKind::ParameterDoc), 2);
        report.saved.push(artifact("a", ArtifactKind::ParameterDoc));
        report.saved.push(artifact("b", ArtifactKind::ParameterDoc));
        assert_eq!(report.effective_count(), 2);

        report.compiled.push(artifact("a", ArtifactKind::Dashboard));
        assert_eq!(report.effective_count(), 1);
    }

    #[test]
    fn task_type_serializes_lowercase() {
        let json = serde_json::to_string(&TaskType::Epic).expect("serialize");
        assert_eq!(json, "\"epic\"");
        assert_eq!(TaskType::Task.as_str(), "task");
    }
}
