//! Fixed routing tables from artifact codes to output locations.
//!
//! Every table here is a `match` over a closed enum, so routing is total and
//! side-effect free. Unknown codes are represented as `None` rather than an
//! error: callers must degrade gracefully on task-id shapes they don't know.

use serde::{Deserialize, Serialize};

/// Artifact kinds a task can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Dashboard,
    AlertRule,
    Slo,
    NotificationPolicy,
    LogRule,
    Runbook,
    ParameterDoc,
}

/// How sanitized content is post-processed before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    /// Truncate to the first complete JSON value.
    Json,
    /// Truncate at the first markdown heading line.
    Yaml,
    Markdown,
    /// Data literal (Jsonnet params); only fences are stripped.
    Literal,
}

/// Output location metadata for one artifact kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRoute {
    pub directory: &'static str,
    pub suffix: &'static str,
    pub extension: &'static str,
    /// Secondary compiler invoked on saved files of this kind.
    pub compiler: Option<&'static str>,
}

/// Jsonnet factory used to compile parameter documents into a final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileFactory {
    /// File stem under `<mixin>/services/`.
    pub name: &'static str,
    /// Final artifact format; YAML output is requested as a raw string.
    pub format: ContentFormat,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Dashboard,
        ArtifactKind::AlertRule,
        ArtifactKind::Slo,
        ArtifactKind::NotificationPolicy,
        ArtifactKind::LogRule,
        ArtifactKind::Runbook,
        ArtifactKind::ParameterDoc,
    ];

    /// Type token used in `--- TOKEN: service ---` delimiter lines.
    pub fn delimiter_token(self) -> &'static str {
        match self {
            ArtifactKind::Dashboard => "DASHBOARD",
            ArtifactKind::AlertRule => "PROMETHEUS_RULE",
            ArtifactKind::Slo => "SLO",
            ArtifactKind::NotificationPolicy => "NOTIFICATION",
            ArtifactKind::LogRule => "LOKI_RULE",
            ArtifactKind::Runbook => "RUNBOOK",
            ArtifactKind::ParameterDoc => "PARAMS",
        }
    }

    pub fn route(self) -> OutputRoute {
        let (directory, suffix, extension) = match self {
            ArtifactKind::Dashboard => ("dashboards", "dashboard", "json"),
            ArtifactKind::AlertRule => ("prometheus-rules", "rules", "yaml"),
            ArtifactKind::Slo => ("slo-definitions", "slo", "yaml"),
            ArtifactKind::NotificationPolicy => {
                ("notification-policies", "notifications", "yaml")
            }
            ArtifactKind::LogRule => ("loki-rules", "loki-rules", "yaml"),
            ArtifactKind::Runbook => ("runbooks", "runbook", "md"),
            ArtifactKind::ParameterDoc => ("params", "params", "libsonnet"),
        };
        let compiler = match self {
            ArtifactKind::ParameterDoc => Some("jsonnet"),
            _ => None,
        };
        OutputRoute {
            directory,
            suffix,
            extension,
            compiler,
        }
    }

    pub fn format(self) -> ContentFormat {
        match self.route().extension {
            "json" => ContentFormat::Json,
            "yaml" | "yml" => ContentFormat::Yaml,
            "md" => ContentFormat::Markdown,
            _ => ContentFormat::Literal,
        }
    }

    /// Factory that turns a parameter document into this kind of artifact.
    pub fn compile_factory(self) -> Option<CompileFactory> {
        let (name, format) = match self {
            ArtifactKind::Dashboard => ("dashboard", ContentFormat::Json),
            ArtifactKind::AlertRule => ("alerts", ContentFormat::Yaml),
            ArtifactKind::Slo => ("slo", ContentFormat::Yaml),
            ArtifactKind::NotificationPolicy => ("notification", ContentFormat::Yaml),
            ArtifactKind::LogRule => ("loki_rules", ContentFormat::Yaml),
            ArtifactKind::Runbook | ArtifactKind::ParameterDoc => return None,
        };
        Some(CompileFactory { name, format })
    }

    /// Factory for compiling a saved parameter document into this kind.
    ///
    /// Requires both a compiler on the parameter-document route and a
    /// factory for this kind. Parameter documents themselves have no factory,
    /// so `PARAMS` tasks are save-only.
    pub fn params_factory(self) -> Option<CompileFactory> {
        ArtifactKind::ParameterDoc.route().compiler?;
        self.compile_factory()
    }

    /// Human-readable plural title used in task titles.
    pub fn title(self) -> &'static str {
        match self {
            ArtifactKind::Dashboard => "Grafana dashboards",
            ArtifactKind::AlertRule => "PrometheusRule alert definitions",
            ArtifactKind::Slo => "SLO definitions",
            ArtifactKind::NotificationPolicy => "notification policies",
            ArtifactKind::LogRule => "Loki recording rules",
            ArtifactKind::Runbook => "operational runbooks",
            ArtifactKind::ParameterDoc => "Jsonnet parameter documents",
        }
    }
}

/// Artifact codes as they appear in the third segment of a task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactCode {
    Dashboards,
    Dashboard,
    Alerts,
    Slos,
    Notify,
    LokiRules,
    Runbooks,
    Runbook,
    Params,
}

impl ArtifactCode {
    /// Codes generated for the critical, high and medium tiers.
    pub const STANDARD: [ArtifactCode; 6] = [
        ArtifactCode::Dashboards,
        ArtifactCode::Alerts,
        ArtifactCode::Slos,
        ArtifactCode::Notify,
        ArtifactCode::LokiRules,
        ArtifactCode::Runbooks,
    ];

    /// Reduced set generated for the low tier.
    pub const REDUCED: [ArtifactCode; 2] = [ArtifactCode::Dashboard, ArtifactCode::Runbook];

    pub fn parse(code: &str) -> Option<Self> {
        let parsed = match code {
            "DASHBOARDS" => ArtifactCode::Dashboards,
            "DASHBOARD" => ArtifactCode::Dashboard,
            "ALERTS" => ArtifactCode::Alerts,
            "SLOS" => ArtifactCode::Slos,
            "NOTIFY" => ArtifactCode::Notify,
            "LOKI-RULES" => ArtifactCode::LokiRules,
            "RUNBOOKS" => ArtifactCode::Runbooks,
            "RUNBOOK" => ArtifactCode::Runbook,
            "PARAMS" => ArtifactCode::Params,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactCode::Dashboards => "DASHBOARDS",
            ArtifactCode::Dashboard => "DASHBOARD",
            ArtifactCode::Alerts => "ALERTS",
            ArtifactCode::Slos => "SLOS",
            ArtifactCode::Notify => "NOTIFY",
            ArtifactCode::LokiRules => "LOKI-RULES",
            ArtifactCode::Runbooks => "RUNBOOKS",
            ArtifactCode::Runbook => "RUNBOOK",
            ArtifactCode::Params => "PARAMS",
        }
    }

    pub fn kind(self) -> ArtifactKind {
        match self {
            ArtifactCode::Dashboards | ArtifactCode::Dashboard => ArtifactKind::Dashboard,
            ArtifactCode::Alerts => ArtifactKind::AlertRule,
            ArtifactCode::Slos => ArtifactKind::Slo,
            ArtifactCode::Notify => ArtifactKind::NotificationPolicy,
            ArtifactCode::LokiRules => ArtifactKind::LogRule,
            ArtifactCode::Runbooks | ArtifactCode::Runbook => ArtifactKind::Runbook,
            ArtifactCode::Params => ArtifactKind::ParameterDoc,
        }
    }

    /// Singular codes name a single artifact in titles.
    pub fn is_singular(self) -> bool {
        matches!(self, ArtifactCode::Dashboard | ArtifactCode::Runbook)
    }
}

/// Route a raw artifact code string. Unknown codes yield `None`.
pub fn route(code: &str) -> Option<(ArtifactKind, OutputRoute)> {
    let kind = ArtifactCode::parse(code)?.kind();
    Some((kind, kind.route()))
}
