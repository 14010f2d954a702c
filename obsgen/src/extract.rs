//! Run-time orchestration: `extract`, `extract-dir` and `complete-epics`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::payload::RawOutput;
use crate::core::task_id::TaskId;
use crate::core::taxonomy::ServiceTaxonomy;
use crate::core::types::{ExtractionReport, TaskType};
use crate::exit_codes;
use crate::io::compiler::{JsonnetCompiler, ParamCompiler};
use crate::io::config::ObsgenConfig;
use crate::io::extractor::ArtifactExtractor;
use crate::io::layout::OutputLayout;
use crate::io::sources::load_taxonomy;
use crate::io::task_store::TaskStore;

const INPUT_EXTENSIONS: [&str; 2] = ["txt", "json"];

/// Shared state for extracting one or many task outputs.
pub struct ExtractSession<'a> {
    layout: OutputLayout,
    taxonomy: ServiceTaxonomy,
    store: TaskStore,
    compiler: &'a dyn ParamCompiler,
}

impl<'a> ExtractSession<'a> {
    pub fn new(cfg: &ObsgenConfig, compiler: &'a dyn ParamCompiler) -> Self {
        Self {
            layout: OutputLayout::new(&cfg.output_dir),
            taxonomy: load_taxonomy(&cfg.sources),
            store: TaskStore::new(&cfg.state_dir),
            compiler,
        }
    }

    /// Services a task should produce artifacts for.
    ///
    /// Explicit overrides win, then the service recorded on the task state,
    /// then the taxonomy's reading of the task id.
    pub fn expected_services(&self, task_id: &str, overrides: &[String]) -> Result<Vec<String>> {
        if !overrides.is_empty() {
            return Ok(overrides.to_vec());
        }
        if self.store.record_path(task_id).exists() {
            let record = self.store.load(task_id)?;
            if let Some(service) = record.attributes.service_name {
                return Ok(vec![service]);
            }
        }
        Ok(TaskId::parse(task_id)
            .map(|id| self.taxonomy.expected_services(&id))
            .unwrap_or_default())
    }

    /// Extract one task's output file.
    #[instrument(skip_all, fields(task_id = %task_id, input = %input.display()))]
    pub fn extract_file(
        &self,
        task_id: &str,
        input: &Path,
        overrides: &[String],
    ) -> Result<ExtractionReport> {
        let contents = fs::read_to_string(input)
            .with_context(|| format!("read task output {}", input.display()))?;
        let expected = self.expected_services(task_id, overrides)?;
        ArtifactExtractor::new(&self.layout, self.compiler).extract(
            task_id,
            RawOutput::from_file_contents(contents),
            &expected,
        )
    }

    /// Extract every `<TASK_ID>.txt` / `<TASK_ID>.json` file in `dir`.
    ///
    /// A failing task is recorded and the walk continues.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn extract_dir(&self, dir: &Path) -> Result<DirSummary> {
        let mut summary = DirSummary::default();
        for path in input_files(dir)? {
            let Some(task_id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            match self.extract_file(&task_id, &path, &[]) {
                Ok(report) => summary.reports.push(report),
                Err(err) => {
                    warn!(task_id = %task_id, error = %format!("{err:#}"), "extraction failed");
                    summary.errors.push(TaskError {
                        task_id,
                        message: format!("{err:#}"),
                    });
                }
            }
        }
        info!(
            tasks = summary.reports.len(),
            errors = summary.errors.len(),
            saved = summary.saved_count(),
            "directory extraction finished"
        );
        Ok(summary)
    }
}

/// Build a session with the configured Jsonnet compiler and extract one file.
pub fn extract_task(
    cfg: &ObsgenConfig,
    task_id: &str,
    input: &Path,
    overrides: &[String],
) -> Result<ExtractionReport> {
    let compiler = JsonnetCompiler::from_config(&cfg.compiler);
    ExtractSession::new(cfg, &compiler).extract_file(task_id, input, overrides)
}

pub fn extract_dir(cfg: &ObsgenConfig, dir: &Path) -> Result<DirSummary> {
    let compiler = JsonnetCompiler::from_config(&cfg.compiler);
    ExtractSession::new(cfg, &compiler).extract_dir(dir)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    pub task_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct DirSummary {
    pub reports: Vec<ExtractionReport>,
    pub errors: Vec<TaskError>,
}

impl DirSummary {
    pub fn saved_count(&self) -> usize {
        self.reports.iter().map(ExtractionReport::saved_count).sum()
    }
}

/// Exit code for a single task's extraction.
pub fn report_exit_code(report: &ExtractionReport) -> i32 {
    if report.saved_count() == 0 {
        exit_codes::EMPTY
    } else if report.truncation.is_some() {
        exit_codes::PARTIAL
    } else {
        exit_codes::OK
    }
}

/// Exit code for a directory run: empty beats partial beats ok.
pub fn dir_exit_code(summary: &DirSummary) -> i32 {
    if summary.saved_count() == 0 {
        exit_codes::EMPTY
    } else if !summary.errors.is_empty()
        || summary.reports.iter().any(|r| r.truncation.is_some())
    {
        exit_codes::PARTIAL
    } else {
        exit_codes::OK
    }
}

/// One-line summary per report, followed by indented details.
pub fn render_report(report: &ExtractionReport) -> String {
    let mut out = String::new();
    if let Some(reason) = report.ignored {
        let _ = writeln!(out, "{}: ignored ({reason:?})", report.task_id);
        return out;
    }
    let _ = write!(
        out,
        "{}: {} saved, {} compiled",
        report.task_id,
        report.saved_count(),
        report.compiled_count()
    );
    if let Some(trunc) = report.truncation {
        let _ = write!(
            out,
            " [WARN: {}/{} services - check for truncation]",
            trunc.saved, trunc.expected
        );
    }
    out.push('\n');
    for saved in report.saved.iter().chain(&report.compiled) {
        let _ = writeln!(out, "  wrote {}", saved.path.display());
    }
    for skipped in &report.skipped {
        let _ = writeln!(
            out,
            "  skipped {} block for {} ({:?})",
            skipped.declared_type, skipped.service, skipped.reason
        );
    }
    for failure in &report.failures {
        let _ = writeln!(out, "  failed {}: {}", failure.service, failure.message);
    }
    for failure in &report.compile_failures {
        let _ = writeln!(out, "  compile failed {}: {}", failure.service, failure.message);
    }
    out
}

/// Mark every epic task state done. Returns the ids that changed.
pub fn complete_epics(cfg: &ObsgenConfig, now: DateTime<Utc>) -> Result<Vec<String>> {
    let store = TaskStore::new(&cfg.state_dir);
    let mut completed = Vec::new();
    for record in store.list()? {
        if record.attributes.task_type != TaskType::Epic {
            continue;
        }
        if store.mark_done(&record.task_id, now)? {
            info!(task_id = %record.task_id, "auto-completed epic");
            completed.push(record.task_id);
        } else {
            debug!(task_id = %record.task_id, "epic already done");
        }
    }
    Ok(completed)
}

fn input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read directory entry in {}", dir.display()))?
            .path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| INPUT_EXTENSIONS.contains(&ext));
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::ArtifactKind;
    use crate::core::task_id::EPIC_ID;
    use crate::core::types::{PlanMode, SavedArtifact, TruncationWarning};
    use crate::io::task_store::{PlanIdentity, TaskStatus, WriteOptions};
    use crate::plan::build_graph;
    use crate::test_support::{ScriptedCompiler, TestWorkspace};

    #[test]
    fn expected_services_prefer_overrides_then_taxonomy() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let session = ExtractSession::new(&ws.config(), &compiler);

        let overrides = vec!["cartservice".to_string()];
        assert_eq!(
            session.expected_services("OB-CRIT-ALERTS", &overrides).expect("overrides"),
            overrides
        );
        assert_eq!(
            session.expected_services("OB-LOW-RUNBOOK", &[]).expect("tier").len(),
            1
        );
        assert_eq!(
            session.expected_services("OB-FRONTEND-SLOS", &[]).expect("service"),
            ["frontend"]
        );
        assert!(session.expected_services("OB-LOAD", &[]).expect("none").is_empty());
    }

    #[test]
    fn directory_run_isolates_failing_tasks() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let session = ExtractSession::new(&ws.config(), &compiler);

        let inputs = ws.root().join("outputs");
        fs::create_dir_all(&inputs).expect("inputs dir");
        fs::write(
            inputs.join("OB-FRONTEND-DASHBOARDS.txt"),
            "--- DASHBOARD: frontend ---\n{\"title\":\"x\"}\n",
        )
        .expect("write");
        fs::write(inputs.join("OB-LOAD.json"), "{\"text\": \"loaded\"}").expect("write");
        fs::write(inputs.join("notes.md"), "ignored").expect("write");

        let summary = session.extract_dir(&inputs).expect("extract dir");
        assert_eq!(summary.reports.len(), 2);
        assert!(summary.errors.is_empty());
        assert_eq!(summary.saved_count(), 1);
        assert_eq!(dir_exit_code(&summary), exit_codes::OK);
        assert_eq!(ws.read("dashboards/frontend-dashboard.json"), "{\"title\":\"x\"}\n");
    }

    #[test]
    fn exit_codes_follow_report_shape() {
        let mut report = ExtractionReport::new("OB-CRIT-ALERTS", None, 2);
        assert_eq!(report_exit_code(&report), exit_codes::EMPTY);
        report.saved.push(SavedArtifact {
            service: "a".to_string(),
            kind: ArtifactKind::AlertRule,
            path: PathBuf::from("a-rules.yaml"),
        });
        report.truncation = Some(TruncationWarning {
            expected: 2,
            saved: 1,
        });
        assert_eq!(report_exit_code(&report), exit_codes::PARTIAL);
        report.truncation = None;
        assert_eq!(report_exit_code(&report), exit_codes::OK);
    }

    #[test]
    fn complete_epics_marks_only_epics() {
        let ws = TestWorkspace::new();
        let cfg = ws.config();
        let tasks = build_graph(&cfg, PlanMode::Batched).expect("graph");
        let store = TaskStore::new(&cfg.state_dir);
        store
            .write_plan(
                &tasks,
                &PlanIdentity::new("demo", "s1"),
                WriteOptions::default(),
                Utc::now(),
            )
            .expect("write plan");

        assert_eq!(complete_epics(&cfg, Utc::now()).expect("first"), [EPIC_ID]);
        assert!(complete_epics(&cfg, Utc::now()).expect("second").is_empty());
        let epic = store.load(EPIC_ID).expect("epic");
        assert_eq!(epic.attributes.status, TaskStatus::Done);
        let other = store.load("OB-CRIT-SLOS").expect("task");
        assert_eq!(other.attributes.status, TaskStatus::Todo);
    }
}
