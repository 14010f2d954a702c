//! Persisted task-state records, one JSON file per task.
//!
//! Records are span-shaped so an external tracker can replay them as a
//! trace: every task of a plan shares one trace id and non-epic tasks are
//! parented on the epic's span. Loading validates against the embedded
//! schema.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use jsonschema::{Validator, validator_for};
use rand::random;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::types::{TaskDescriptor, TaskType};
use crate::io::layout::write_atomic;

pub const SCHEMA_VERSION: u32 = 2;

const TASK_STATE_SCHEMA: &str = include_str!("../../../schemas/task_state/v2.schema.json");

static TASK_STATE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(TASK_STATE_SCHEMA).expect("task state schema should be valid JSON");
    validator_for(&schema).expect("task state schema should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

/// Task attributes, keyed with dotted names on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttributes {
    #[serde(rename = "task.id")]
    pub id: String,
    #[serde(rename = "task.title")]
    pub title: String,
    #[serde(rename = "task.type")]
    pub task_type: TaskType,
    #[serde(rename = "task.status")]
    pub status: TaskStatus,
    #[serde(rename = "task.priority")]
    pub priority: String,
    #[serde(rename = "task.prompt")]
    pub prompt: String,
    #[serde(rename = "task.depends_on")]
    pub depends_on: Vec<String>,
    #[serde(rename = "task.phase")]
    pub phase: u32,
    #[serde(
        rename = "task.service_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_name: Option<String>,
    #[serde(rename = "project.id")]
    pub project_id: String,
    #[serde(rename = "sprint.id")]
    pub sprint_id: String,
}

/// One persisted task (`<state_dir>/<TASK_ID>.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateRecord {
    pub task_id: String,
    pub span_name: String,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub attributes: TaskAttributes,
    pub events: Vec<Value>,
    pub status: SpanStatus,
    pub status_description: Option<String>,
    pub schema_version: u32,
    pub project_id: String,
}

/// Identifiers shared by every record of one plan.
#[derive(Debug, Clone)]
pub struct PlanIdentity {
    pub project_id: String,
    pub sprint_id: String,
    pub trace_id: String,
}

impl PlanIdentity {
    pub fn new(project_id: &str, sprint_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            sprint_id: sprint_id.to_string(),
            trace_id: new_trace_id(),
        }
    }
}

pub fn new_trace_id() -> String {
    format!("{:032x}", random::<u128>())
}

pub fn new_span_id() -> String {
    format!("{:016x}", random::<u64>())
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Early phases are worked first and get the higher priority.
fn priority(phase: u32) -> &'static str {
    if phase <= 2 { "high" } else { "medium" }
}

impl TaskStateRecord {
    pub fn new(
        task: &TaskDescriptor,
        identity: &PlanIdentity,
        parent_span_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            span_name: format!("task:{}", task.id),
            trace_id: identity.trace_id.clone(),
            span_id: new_span_id(),
            parent_span_id: parent_span_id.map(str::to_string),
            start_time: timestamp(now),
            end_time: None,
            attributes: TaskAttributes {
                id: task.id.clone(),
                title: task.title.clone(),
                task_type: task.task_type,
                status: TaskStatus::Todo,
                priority: priority(task.phase).to_string(),
                prompt: task.prompt.clone(),
                depends_on: task.depends_on.clone(),
                phase: task.phase,
                service_name: task.service_name.clone(),
                project_id: identity.project_id.clone(),
                sprint_id: identity.sprint_id.clone(),
            },
            events: Vec::new(),
            status: SpanStatus::Unset,
            status_description: None,
            schema_version: SCHEMA_VERSION,
            project_id: identity.project_id.clone(),
        }
    }

    /// Mark the task done. Returns `false` if it already was.
    pub fn mark_done(&mut self, now: DateTime<Utc>) -> bool {
        if self.attributes.status == TaskStatus::Done && self.status == SpanStatus::Ok {
            return false;
        }
        self.attributes.status = TaskStatus::Done;
        self.status = SpanStatus::Ok;
        self.end_time = Some(timestamp(now));
        true
    }
}

/// Options for [`TaskStore::write_plan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Remove existing records first.
    pub clean: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
    pub removed: usize,
}

/// Directory of task-state records.
#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }

    /// Load and schema-validate one record.
    pub fn load(&self, task_id: &str) -> Result<TaskStateRecord> {
        load_record(&self.record_path(task_id))
    }

    pub fn write(&self, record: &TaskStateRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create directory {}", self.dir.display()))?;
        let value = serde_json::to_value(record).context("serialize task state")?;
        validate_schema(&value).with_context(|| format!("task state {}", record.task_id))?;
        let mut buf = serde_json::to_string_pretty(&value).context("serialize task state")?;
        buf.push('\n');
        write_atomic(&self.record_path(&record.task_id), &buf)
    }

    /// Every record in the store, sorted by task id.
    pub fn list(&self) -> Result<Vec<TaskStateRecord>> {
        let mut records = record_files(&self.dir)?
            .iter()
            .map(|path| load_record(path))
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(records)
    }

    /// Delete every record file. Returns the number removed.
    pub fn clean(&self) -> Result<usize> {
        let files = record_files(&self.dir)?;
        for path in &files {
            fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
        }
        Ok(files.len())
    }

    /// Persist a planned graph. Existing records are kept unless `clean` is
    /// set; the epic's span parents every other record.
    pub fn write_plan(
        &self,
        tasks: &[TaskDescriptor],
        identity: &PlanIdentity,
        options: WriteOptions,
        now: DateTime<Utc>,
    ) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        if options.clean {
            summary.removed = self.clean()?;
            info!(removed = summary.removed, dir = %self.dir.display(), "cleaned task states");
        }

        let mut epic_span: Option<String> = None;
        for task in tasks.iter().filter(|t| t.task_type == TaskType::Epic) {
            if self.record_path(&task.id).exists() {
                epic_span = Some(self.load(&task.id)?.span_id);
            }
        }

        let mut ordered: Vec<&TaskDescriptor> = tasks.iter().collect();
        ordered.sort_by_key(|t| t.task_type != TaskType::Epic);
        for task in ordered {
            if self.record_path(&task.id).exists() {
                debug!(task_id = %task.id, "task state exists, skipping");
                summary.skipped.push(task.id.clone());
                continue;
            }
            let parent = match task.task_type {
                TaskType::Epic => None,
                TaskType::Task => epic_span.as_deref(),
            };
            let record = TaskStateRecord::new(task, identity, parent, now);
            self.write(&record)?;
            if task.task_type == TaskType::Epic {
                epic_span = Some(record.span_id.clone());
            }
            summary.created.push(task.id.clone());
        }
        Ok(summary)
    }

    /// Mark one task done. Returns `false` when it was already done.
    pub fn mark_done(&self, task_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut record = self.load(task_id)?;
        let changed = record.mark_done(now);
        if changed {
            self.write(&record)?;
            debug!(task_id, "marked task done");
        }
        Ok(changed)
    }
}

fn load_record(path: &Path) -> Result<TaskStateRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read task state {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse task state {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("task state {}", path.display()))?;
    serde_json::from_value(value)
        .with_context(|| format!("deserialize task state {}", path.display()))
}

fn validate_schema(value: &Value) -> Result<()> {
    if TASK_STATE_VALIDATOR.is_valid(value) {
        return Ok(());
    }
    let messages = TASK_STATE_VALIDATOR
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Err(anyhow!("schema validation failed: {}", messages.join("; ")))
}

fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read directory entry in {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
