//! Phase-gated task graph generation.
//!
//! Two pure builders share one skeleton: an epic at phase 0, one phase per
//! criticality tier, then load/verify/summary. Batched mode emits one task per
//! (tier, artifact code); decomposed mode emits one per (service, code).

use std::collections::BTreeMap;

use serde::Serialize;

use super::context::{ServiceContext, SourceData, merge_context};
use super::router::{ArtifactCode, ArtifactKind};
use super::task_id::{EPIC_ID, LOAD_ID, SUMMARY_ID, TaskId, VERIFY_ID};
use super::taxonomy::{ServiceTaxonomy, Tier, scope_token};
use super::types::{PlanMode, TaskArtifactRequest, TaskDescriptor, TaskType};

pub const EPIC_PHASE: u32 = 0;
pub const LOAD_PHASE: u32 = 5;
pub const VERIFY_PHASE: u32 = 6;
pub const SUMMARY_PHASE: u32 = 7;

/// Expected services per artifact kind, for the verification prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub rows: Vec<CoverageRow>,
    pub total_expected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageRow {
    pub kind: ArtifactKind,
    pub directory: &'static str,
    pub title: &'static str,
    pub services: Vec<String>,
}

/// Renders task prompts. Implementations must not fail; a rendering problem
/// is expected to degrade to a shorter instruction.
pub trait PromptSource {
    fn artifact(&self, code: ArtifactCode, tier: Tier, services: &[ServiceContext]) -> String;
    fn epic(&self, service_count: usize) -> String;
    fn load(&self) -> String;
    fn verify(&self, coverage: &Coverage) -> String;
    fn summary(&self) -> String;
}

/// Everything a builder reads.
pub struct GraphInputs<'a> {
    pub taxonomy: &'a ServiceTaxonomy,
    pub contexts: &'a BTreeMap<String, ServiceContext>,
    pub prompts: &'a dyn PromptSource,
}

impl GraphInputs<'_> {
    fn context(&self, name: &str) -> ServiceContext {
        match self.contexts.get(name) {
            Some(ctx) => ctx.clone(),
            None => merge_context(name, self.taxonomy, &SourceData::default()),
        }
    }
}

/// Build the graph for `mode`.
pub fn build(mode: PlanMode, inputs: &GraphInputs<'_>) -> Vec<TaskDescriptor> {
    match mode {
        PlanMode::Batched => build_batched(inputs),
        PlanMode::Decomposed => build_decomposed(inputs),
    }
}

/// One task per (tier, code), gated on the previous tier's dashboards.
pub fn build_batched(inputs: &GraphInputs<'_>) -> Vec<TaskDescriptor> {
    let mut tasks = vec![epic_task(inputs)];
    let mut gate: Vec<String> = Vec::new();

    for tier in Tier::ALL {
        let members = inputs.taxonomy.members(tier);
        let contexts: Vec<ServiceContext> = members.iter().map(|m| inputs.context(m)).collect();
        let mut dashboards = Vec::new();

        for &code in tier.artifact_codes() {
            let id = TaskId::new(tier.code(), code).to_string();
            if code.kind() == ArtifactKind::Dashboard {
                dashboards.push(id.clone());
            }
            tasks.push(TaskDescriptor {
                title: format!(
                    "Generate {} {} ({} tier)",
                    members.len(),
                    artifact_title(code),
                    tier.name()
                ),
                task_type: TaskType::Task,
                phase: tier.phase(),
                depends_on: gate.clone(),
                prompt: inputs.prompts.artifact(code, tier, &contexts),
                service_name: None,
                artifact: Some(TaskArtifactRequest {
                    code: code.as_str().to_string(),
                    services: members.to_vec(),
                }),
                id,
            });
        }
        gate = dashboards;
    }

    finish(tasks, inputs)
}

/// One task per (service, code), gated on every dashboard task of the
/// nearest earlier tier that has services.
pub fn build_decomposed(inputs: &GraphInputs<'_>) -> Vec<TaskDescriptor> {
    let mut tasks = vec![epic_task(inputs)];
    let mut gate: Vec<String> = Vec::new();

    for tier in Tier::ALL {
        let mut members = inputs.taxonomy.members(tier).to_vec();
        if members.is_empty() {
            continue;
        }
        members.sort();
        let mut dashboards = Vec::new();

        for service in &members {
            let context = inputs.context(service);
            let scope = scope_token(service);
            for &code in tier.artifact_codes() {
                let id = TaskId::new(&scope, code).to_string();
                if code.kind() == ArtifactKind::Dashboard {
                    dashboards.push(id.clone());
                }
                tasks.push(TaskDescriptor {
                    title: format!(
                        "Generate {} for {} ({} tier)",
                        artifact_title(code),
                        service,
                        tier.name()
                    ),
                    task_type: TaskType::Task,
                    phase: tier.phase(),
                    depends_on: gate.clone(),
                    prompt: inputs
                        .prompts
                        .artifact(code, tier, std::slice::from_ref(&context)),
                    service_name: Some(service.clone()),
                    artifact: Some(TaskArtifactRequest {
                        code: code.as_str().to_string(),
                        services: vec![service.clone()],
                    }),
                    id,
                });
            }
        }
        gate = dashboards;
    }

    finish(tasks, inputs)
}

fn epic_task(inputs: &GraphInputs<'_>) -> TaskDescriptor {
    TaskDescriptor {
        id: EPIC_ID.to_string(),
        title: "Observability artifact generation".to_string(),
        task_type: TaskType::Epic,
        phase: EPIC_PHASE,
        depends_on: Vec::new(),
        prompt: inputs.prompts.epic(inputs.taxonomy.len()),
        service_name: None,
        artifact: None,
    }
}

/// Append load, verify and summary tasks after the artifact tasks.
fn finish(mut tasks: Vec<TaskDescriptor>, inputs: &GraphInputs<'_>) -> Vec<TaskDescriptor> {
    let artifact_ids: Vec<String> = tasks
        .iter()
        .filter(|t| t.artifact.is_some())
        .map(|t| t.id.clone())
        .collect();
    let coverage = coverage(&tasks);

    tasks.push(utility_task(
        LOAD_ID,
        "Import observability artifacts to Grafana stack",
        LOAD_PHASE,
        artifact_ids,
        inputs.prompts.load(),
    ));
    tasks.push(utility_task(
        VERIFY_ID,
        "Verify artifact generation and loading",
        VERIFY_PHASE,
        vec![LOAD_ID.to_string()],
        inputs.prompts.verify(&coverage),
    ));
    tasks.push(utility_task(
        SUMMARY_ID,
        "Generate execution summary and coverage report",
        SUMMARY_PHASE,
        vec![VERIFY_ID.to_string()],
        inputs.prompts.summary(),
    ));
    tasks
}

fn utility_task(
    id: &str,
    title: &str,
    phase: u32,
    depends_on: Vec<String>,
    prompt: String,
) -> TaskDescriptor {
    TaskDescriptor {
        id: id.to_string(),
        title: title.to_string(),
        task_type: TaskType::Task,
        phase,
        depends_on,
        prompt,
        service_name: None,
        artifact: None,
    }
}

/// Expected services per artifact kind across all artifact tasks.
pub fn coverage(tasks: &[TaskDescriptor]) -> Coverage {
    let mut by_kind: BTreeMap<ArtifactKind, Vec<String>> = BTreeMap::new();
    for request in tasks.iter().filter_map(|t| t.artifact.as_ref()) {
        let Some(code) = ArtifactCode::parse(&request.code) else {
            continue;
        };
        let services = by_kind.entry(code.kind()).or_default();
        for service in &request.services {
            if !services.contains(service) {
                services.push(service.clone());
            }
        }
    }

    let rows: Vec<CoverageRow> = by_kind
        .into_iter()
        .map(|(kind, services)| CoverageRow {
            kind,
            directory: kind.route().directory,
            title: kind.title(),
            services,
        })
        .collect();
    let total_expected = rows.iter().map(|r| r.services.len()).sum();
    Coverage {
        rows,
        total_expected,
    }
}

/// Title fragment for a code; singular codes read as one artifact.
pub fn artifact_title(code: ArtifactCode) -> &'static str {
    match code {
        ArtifactCode::Dashboard => "Grafana dashboard",
        ArtifactCode::Runbook => "operational runbook",
        other => other.kind().title(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::core::context::build_contexts;
    use crate::core::invariants::validate_graph;
    use crate::core::taxonomy::ServiceInfo;

    struct StubPrompts;

    impl PromptSource for StubPrompts {
        fn artifact(&self, code: ArtifactCode, tier: Tier, services: &[ServiceContext]) -> String {
            let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
            format!("{} {} {}", code.as_str(), tier.code(), names.join(","))
        }
        fn epic(&self, service_count: usize) -> String {
            format!("epic {service_count}")
        }
        fn load(&self) -> String {
            "load".into()
        }
        fn verify(&self, coverage: &Coverage) -> String {
            format!("verify {}", coverage.total_expected)
        }
        fn summary(&self) -> String {
            "summary".into()
        }
    }

    fn graph(mode: PlanMode, taxonomy: &ServiceTaxonomy) -> Vec<TaskDescriptor> {
        let contexts = build_contexts(taxonomy, &SourceData::default());
        let inputs = GraphInputs {
            taxonomy,
            contexts: &contexts,
            prompts: &StubPrompts,
        };
        build(mode, &inputs)
    }

    fn find<'a>(tasks: &'a [TaskDescriptor], id: &str) -> &'a TaskDescriptor {
        tasks
            .iter()
            .find(|t| t.id == id)
            .unwrap_or_else(|| panic!("missing task {id}"))
    }

    #[test]
    fn batched_graph_matches_demo_shape() {
        let tasks = graph(PlanMode::Batched, &ServiceTaxonomy::online_boutique());
        // epic + 3 tiers * 6 + low tier * 2 + load/verify/summary
        assert_eq!(tasks.len(), 1 + 18 + 2 + 3);

        let epic = find(&tasks, "OB-EPIC");
        assert_eq!(epic.task_type, TaskType::Epic);
        assert_eq!(epic.phase, 0);
        assert!(epic.depends_on.is_empty());

        let crit = find(&tasks, "OB-CRIT-ALERTS");
        assert_eq!(crit.phase, 1);
        assert!(crit.depends_on.is_empty());
        assert_eq!(crit.title, "Generate 4 PrometheusRule alert definitions (critical tier)");
        assert_eq!(crit.artifact.as_ref().map(|a| a.services.len()), Some(4));

        let med = find(&tasks, "OB-MED-RUNBOOKS");
        assert_eq!(med.depends_on, ["OB-HIGH-DASHBOARDS"]);
        let low = find(&tasks, "OB-LOW-DASHBOARD");
        assert_eq!(low.phase, 4);
        assert_eq!(low.depends_on, ["OB-MED-DASHBOARDS"]);

        let load = find(&tasks, "OB-LOAD");
        assert_eq!(load.depends_on.len(), 20);
        assert_eq!(find(&tasks, "OB-SUMMARY").phase, SUMMARY_PHASE);
    }

    #[test]
    fn batched_and_decomposed_graphs_are_valid() {
        let taxonomy = ServiceTaxonomy::online_boutique();
        for mode in [PlanMode::Batched, PlanMode::Decomposed] {
            let tasks = graph(mode, &taxonomy);
            let errors = validate_graph(&tasks);
            assert!(errors.is_empty(), "{mode:?}: {errors:?}");
        }
    }

    #[test]
    fn decomposed_gating_is_exact() {
        let tasks = graph(PlanMode::Decomposed, &ServiceTaxonomy::online_boutique());
        // 10 services * 6 + loadgenerator * 2
        let artifact_tasks: Vec<_> = tasks.iter().filter(|t| t.artifact.is_some()).collect();
        assert_eq!(artifact_tasks.len(), 62);

        let shipping = find(&tasks, "OB-SHIPPINGSERVICE-SLOS");
        let expected: HashSet<&str> = [
            "OB-CARTSERVICE-DASHBOARDS",
            "OB-CHECKOUTSERVICE-DASHBOARDS",
            "OB-FRONTEND-DASHBOARDS",
            "OB-PAYMENTSERVICE-DASHBOARDS",
        ]
        .into_iter()
        .collect();
        let actual: HashSet<&str> = shipping.depends_on.iter().map(String::as_str).collect();
        assert_eq!(actual, expected);
        assert_eq!(shipping.service_name.as_deref(), Some("shippingservice"));

        let loadgen = find(&tasks, "OB-LOADGENERATOR-RUNBOOK");
        assert_eq!(loadgen.depends_on.len(), 3);
        assert!(find(&tasks, "OB-FRONTEND-ALERTS").depends_on.is_empty());
    }

    #[test]
    fn decomposed_orders_services_alphabetically() {
        let tasks = graph(PlanMode::Decomposed, &ServiceTaxonomy::online_boutique());
        let crit_dashboards: Vec<_> = tasks
            .iter()
            .filter(|t| t.phase == 1 && t.id.ends_with("-DASHBOARDS"))
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(
            crit_dashboards,
            [
                "OB-CARTSERVICE-DASHBOARDS",
                "OB-CHECKOUTSERVICE-DASHBOARDS",
                "OB-FRONTEND-DASHBOARDS",
                "OB-PAYMENTSERVICE-DASHBOARDS",
            ]
        );
    }

    #[test]
    fn decomposed_gate_skips_empty_tiers() {
        let mut taxonomy = ServiceTaxonomy::new();
        taxonomy.insert("api", Tier::Critical, ServiceInfo::default());
        taxonomy.insert("batch", Tier::Low, ServiceInfo::default());
        let tasks = graph(PlanMode::Decomposed, &taxonomy);
        assert_eq!(find(&tasks, "OB-BATCH-RUNBOOK").depends_on, ["OB-API-DASHBOARDS"]);
        assert!(validate_graph(&tasks).is_empty());
    }

    #[test]
    fn builds_are_deterministic() {
        let taxonomy = ServiceTaxonomy::online_boutique();
        for mode in [PlanMode::Batched, PlanMode::Decomposed] {
            assert_eq!(graph(mode, &taxonomy), graph(mode, &taxonomy));
        }
    }

    #[test]
    fn coverage_counts_expected_files() {
        let tasks = graph(PlanMode::Batched, &ServiceTaxonomy::online_boutique());
        let coverage = coverage(&tasks);
        assert_eq!(coverage.total_expected, 62);
        let dashboards = coverage
            .rows
            .iter()
            .find(|r| r.kind == ArtifactKind::Dashboard)
            .expect("dashboard row");
        assert_eq!(dashboards.services.len(), 11);
        assert_eq!(find(&tasks, "OB-VERIFY").prompt, "verify 62");
    }
}
