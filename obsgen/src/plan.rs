//! Task graph planning for `obsgen plan`.

use std::fmt::Write as _;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::core::context::build_contexts;
use crate::core::graph::{self, GraphInputs};
use crate::core::invariants::validate_graph;
use crate::core::types::{PlanMode, TaskDescriptor};
use crate::io::config::ObsgenConfig;
use crate::io::prompt::PromptBook;
use crate::io::sources::{load_sources, load_taxonomy};
use crate::io::task_store::{PlanIdentity, TaskStore, WriteOptions, WriteSummary};

/// Options for one `plan` invocation.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub mode: PlanMode,
    /// Only keep tasks of these phases. The epic (phase 0) is always kept.
    pub phases: Vec<u32>,
    /// Build and print the graph without touching the state directory.
    pub dry_run: bool,
    /// Remove existing task states before writing.
    pub clean: bool,
}

/// Structured planning outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Graph built; nothing persisted.
    Planned(Vec<TaskDescriptor>),
    /// Graph built and persisted.
    Written {
        tasks: Vec<TaskDescriptor>,
        summary: WriteSummary,
    },
}

/// Build the full task graph from the configured sources.
///
/// Fails when the graph violates its structural invariants.
#[instrument(skip_all, fields(mode = ?mode))]
pub fn build_graph(cfg: &ObsgenConfig, mode: PlanMode) -> Result<Vec<TaskDescriptor>> {
    let taxonomy = load_taxonomy(&cfg.sources);
    let sources = load_sources(&cfg.sources);
    let contexts = build_contexts(&taxonomy, &sources);
    let prompts = PromptBook::new(&cfg.output_dir);
    let inputs = GraphInputs {
        taxonomy: &taxonomy,
        contexts: &contexts,
        prompts: &prompts,
    };
    let tasks = graph::build(mode, &inputs);

    let errors = validate_graph(&tasks);
    if !errors.is_empty() {
        bail!("task graph violations:\n- {}", errors.join("\n- "));
    }
    info!(tasks = tasks.len(), services = taxonomy.len(), "built task graph");
    Ok(tasks)
}

/// Keep tasks whose phase is selected. An empty selection keeps everything.
pub fn filter_phases(tasks: Vec<TaskDescriptor>, phases: &[u32]) -> Vec<TaskDescriptor> {
    if phases.is_empty() {
        return tasks;
    }
    tasks
        .into_iter()
        .filter(|task| task.phase == graph::EPIC_PHASE || phases.contains(&task.phase))
        .collect()
}

/// Build, filter and (unless dry-run) persist the plan.
pub fn run_plan(
    cfg: &ObsgenConfig,
    request: &PlanRequest,
    now: DateTime<Utc>,
) -> Result<PlanOutcome> {
    let tasks = filter_phases(build_graph(cfg, request.mode)?, &request.phases);
    if request.dry_run {
        return Ok(PlanOutcome::Planned(tasks));
    }

    let store = TaskStore::new(&cfg.state_dir);
    let identity = PlanIdentity::new(&cfg.project_id, &cfg.sprint_id);
    let summary = store.write_plan(
        &tasks,
        &identity,
        WriteOptions {
            clean: request.clean,
        },
        now,
    )?;
    info!(
        created = summary.created.len(),
        skipped = summary.skipped.len(),
        dir = %store.dir().display(),
        "wrote task states"
    );
    Ok(PlanOutcome::Written { tasks, summary })
}

/// Human-readable listing: one phase/id line and one title line per task.
pub fn render_task_list(tasks: &[TaskDescriptor]) -> String {
    let mut out = String::new();
    for task in tasks {
        let deps = if task.depends_on.is_empty() {
            String::new()
        } else {
            format!(" (depends: {})", task.depends_on.join(", "))
        };
        let _ = writeln!(out, "Phase {}: {}", task.phase, task.id);
        let _ = writeln!(out, "         {}{deps}", task.title);
    }
    let _ = writeln!(out, "Total: {} tasks", tasks.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task_id::{EPIC_ID, LOAD_ID};
    use crate::test_support::TestWorkspace;

    #[test]
    fn phase_filter_keeps_epic() {
        let ws = TestWorkspace::new();
        let tasks = build_graph(&ws.config(), PlanMode::Batched).expect("graph");
        let filtered = filter_phases(tasks, &[1]);
        assert!(filtered.iter().any(|t| t.id == EPIC_ID));
        assert!(filtered.iter().all(|t| t.phase <= 1));
        assert_eq!(filtered.len(), 1 + 6);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let ws = TestWorkspace::new();
        let cfg = ws.config();
        let request = PlanRequest {
            dry_run: true,
            ..PlanRequest::default()
        };
        let outcome = run_plan(&cfg, &request, Utc::now()).expect("plan");
        assert!(matches!(outcome, PlanOutcome::Planned(ref tasks) if tasks.len() == 24));
        assert!(!cfg.state_dir.exists());
    }

    #[test]
    fn plan_persists_every_task() {
        let ws = TestWorkspace::new();
        let cfg = ws.config();
        let outcome = run_plan(&cfg, &PlanRequest::default(), Utc::now()).expect("plan");
        let PlanOutcome::Written { tasks, summary } = outcome else {
            panic!("expected written outcome");
        };
        assert_eq!(summary.created.len(), tasks.len());
        let store = TaskStore::new(&cfg.state_dir);
        let load = store.load(LOAD_ID).expect("load task");
        assert_eq!(load.attributes.depends_on.len(), 20);
    }

    #[test]
    fn listing_shows_dependencies() {
        let ws = TestWorkspace::new();
        let tasks = build_graph(&ws.config(), PlanMode::Batched).expect("graph");
        let listing = render_task_list(&tasks);
        assert!(listing.contains("Phase 0: OB-EPIC"));
        assert!(listing.contains("(depends: OB-CRIT-DASHBOARDS)"));
        assert!(listing.ends_with("Total: 24 tasks\n"));
    }
}
