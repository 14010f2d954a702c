//! Task prompts rendered from minijinja templates.

use std::path::{Path, PathBuf};

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::warn;

use crate::core::context::{NOT_SET, ResourceSpec, ServiceContext};
use crate::core::graph::{Coverage, PromptSource};
use crate::core::router::{ArtifactCode, ArtifactKind, ContentFormat};
use crate::core::taxonomy::Tier;

const SERVICES_TEMPLATE: &str = include_str!("prompts/services.md");
const OUTPUT_FORMAT_TEMPLATE: &str = include_str!("prompts/output_format.md");
const DASHBOARD_TEMPLATE: &str = include_str!("prompts/dashboard.md");
const ALERTS_TEMPLATE: &str = include_str!("prompts/alerts.md");
const SLO_TEMPLATE: &str = include_str!("prompts/slo.md");
const NOTIFICATION_TEMPLATE: &str = include_str!("prompts/notification.md");
const LOKI_RULES_TEMPLATE: &str = include_str!("prompts/loki_rules.md");
const RUNBOOK_TEMPLATE: &str = include_str!("prompts/runbook.md");
const PARAMS_TEMPLATE: &str = include_str!("prompts/params.md");
const EPIC_TEMPLATE: &str = include_str!("prompts/epic.md");
const LOAD_TEMPLATE: &str = include_str!("prompts/load.md");
const VERIFY_TEMPLATE: &str = include_str!("prompts/verify.md");
const SUMMARY_TEMPLATE: &str = include_str!("prompts/summary.md");

/// One service block, flattened to display strings.
#[derive(Debug, Clone, Serialize)]
struct ServiceView {
    name: String,
    language: String,
    description: String,
    criticality: String,
    business_value: String,
    owner: String,
    methods: String,
    availability: String,
    latency_p99: String,
    error_budget: String,
    throughput: String,
    dependencies: String,
    risks: String,
    alert_channels: String,
    port: String,
    requests: String,
    limits: String,
    probe: String,
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

fn resources(spec: &ResourceSpec) -> String {
    format!(
        "{}/{}",
        spec.cpu.as_deref().unwrap_or(NOT_SET),
        spec.memory.as_deref().unwrap_or(NOT_SET)
    )
}

impl ServiceView {
    fn from_context(ctx: &ServiceContext) -> Self {
        let risks = ctx
            .risks
            .iter()
            .map(|risk| format!("{}: {}", risk.priority, risk.description))
            .collect::<Vec<_>>();
        Self {
            name: ctx.name.clone(),
            language: ctx.language.clone(),
            description: ctx.description.clone(),
            criticality: ctx.criticality.clone(),
            business_value: ctx.business_value.clone(),
            owner: ctx.owner.clone(),
            methods: join_or(&ctx.grpc_methods, "N/A (HTTP gateway)"),
            availability: ctx.slo.availability.clone(),
            latency_p99: ctx.slo.latency_p99.clone(),
            error_budget: ctx.slo.error_budget.clone(),
            throughput: ctx.slo.throughput.clone(),
            dependencies: join_or(&ctx.dependencies, "none"),
            risks: if risks.is_empty() {
                "none identified".to_string()
            } else {
                risks.join("; ")
            },
            alert_channels: join_or(&ctx.alert_channels, "none"),
            port: ctx
                .infra
                .port
                .map_or_else(|| NOT_SET.to_string(), |port| port.to_string()),
            requests: resources(&ctx.infra.requests),
            limits: resources(&ctx.infra.limits),
            probe: ctx.infra.probe.map_or_else(
                || NOT_SET.to_string(),
                |probe| format!("{probe:?}").to_lowercase(),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct DirView {
    directory: &'static str,
    title: &'static str,
}

fn template_name(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Dashboard => "dashboard",
        ArtifactKind::AlertRule => "alerts",
        ArtifactKind::Slo => "slo",
        ArtifactKind::NotificationPolicy => "notification",
        ArtifactKind::LogRule => "loki_rules",
        ArtifactKind::Runbook => "runbook",
        ArtifactKind::ParameterDoc => "params",
    }
}

/// Template set used for every task prompt of a plan.
pub struct PromptBook {
    env: Environment<'static>,
    output_dir: PathBuf,
}

impl PromptBook {
    /// `output_dir` is the artifact root referenced by the load and verify
    /// prompts.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("services", SERVICES_TEMPLATE),
            ("output_format", OUTPUT_FORMAT_TEMPLATE),
            ("dashboard", DASHBOARD_TEMPLATE),
            ("alerts", ALERTS_TEMPLATE),
            ("slo", SLO_TEMPLATE),
            ("notification", NOTIFICATION_TEMPLATE),
            ("loki_rules", LOKI_RULES_TEMPLATE),
            ("runbook", RUNBOOK_TEMPLATE),
            ("params", PARAMS_TEMPLATE),
            ("epic", EPIC_TEMPLATE),
            ("load", LOAD_TEMPLATE),
            ("verify", VERIFY_TEMPLATE),
            ("summary", SUMMARY_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("prompt template should be valid");
        }
        Self {
            env,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template.render(ctx)?;
        Ok(rendered.trim().to_string())
    }

    fn render_or(
        &self,
        name: &str,
        ctx: minijinja::Value,
        fallback: impl FnOnce() -> String,
    ) -> String {
        match self.render(name, ctx) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(template = name, error = %err, "prompt rendering failed, using fallback");
                fallback()
            }
        }
    }

    fn output_dir_display(&self) -> String {
        self.output_dir.display().to_string()
    }
}

impl PromptSource for PromptBook {
    fn artifact(&self, code: ArtifactCode, tier: Tier, services: &[ServiceContext]) -> String {
        let kind = code.kind();
        let views = services
            .iter()
            .map(ServiceView::from_context)
            .collect::<Vec<_>>();
        self.render_or(
            template_name(kind),
            context! {
                tier => tier.name(),
                token => kind.delimiter_token(),
                services => views,
            },
            || format!("Generate {} for {} tier.", kind.title(), tier.name()),
        )
    }

    fn epic(&self, service_count: usize) -> String {
        self.render_or("epic", context! { service_count => service_count }, || {
            format!("Observability artifact generation for {service_count} services.")
        })
    }

    fn load(&self) -> String {
        let yaml_dirs = ArtifactKind::ALL
            .into_iter()
            .filter(|kind| kind.format() == ContentFormat::Yaml)
            .map(|kind| DirView {
                directory: kind.route().directory,
                title: kind.title(),
            })
            .collect::<Vec<_>>();
        self.render_or(
            "load",
            context! {
                output_dir => self.output_dir_display(),
                yaml_dirs => yaml_dirs,
            },
            || format!("Import the artifacts under {}.", self.output_dir_display()),
        )
    }

    fn verify(&self, coverage: &Coverage) -> String {
        self.render_or(
            "verify",
            context! {
                output_dir => self.output_dir_display(),
                coverage => coverage,
            },
            || format!("Verify the artifacts under {}.", self.output_dir_display()),
        )
    }

    fn summary(&self) -> String {
        self.render_or("summary", context! {}, || {
            "Summarize the artifact generation run.".to_string()
        })
    }
}
