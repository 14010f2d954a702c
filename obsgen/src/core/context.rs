//! Per-service context merged from the optional data sources.
//!
//! The merge is pure: loaders in `io::sources` produce the partial records
//! defined here, and [`build_contexts`] folds them over the taxonomy. Any
//! missing piece falls back to a fixed default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::taxonomy::ServiceTaxonomy;

pub const UNKNOWN: &str = "unknown";
pub const NOT_SET: &str = "-";

/// Business profile from a ProjectContext document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiskProfile {
    pub criticality: Option<String>,
    pub business_value: Option<String>,
    pub owner: Option<String>,
    pub availability: Option<String>,
    pub latency_p99: Option<String>,
    pub error_budget: Option<String>,
    pub throughput: Option<String>,
    pub risks: Vec<Risk>,
    pub alert_channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub priority: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Grpc,
    Exec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

/// Deployment facts from a Kubernetes manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraFacts {
    pub port: Option<u16>,
    pub requests: ResourceSpec,
    pub limits: ResourceSpec,
    pub probe: Option<ProbeKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SloTargets {
    pub availability: String,
    pub latency_p99: String,
    pub error_budget: String,
    pub throughput: String,
}

/// Everything the prompt templates know about one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContext {
    pub name: String,
    pub language: String,
    pub description: String,
    pub criticality: String,
    pub business_value: String,
    pub owner: String,
    pub dependencies: Vec<String>,
    pub grpc_methods: Vec<String>,
    pub slo: SloTargets,
    pub risks: Vec<Risk>,
    pub alert_channels: Vec<String>,
    pub infra: InfraFacts,
}

/// Partial records keyed by service name, as loaded from disk.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub profiles: BTreeMap<String, RiskProfile>,
    pub api_surface: BTreeMap<String, Vec<String>>,
    pub deployments: BTreeMap<String, InfraFacts>,
}

/// Merge one service's records. Absent inputs fall back to defaults.
pub fn merge_context(
    name: &str,
    taxonomy: &ServiceTaxonomy,
    sources: &SourceData,
) -> ServiceContext {
    let info = taxonomy.info(name).cloned().unwrap_or_default();
    let profile = sources.profiles.get(name).cloned().unwrap_or_default();
    let or = |value: Option<String>, fallback: &str| value.unwrap_or_else(|| fallback.to_string());
    let language = if info.language.is_empty() {
        UNKNOWN.to_string()
    } else {
        info.language
    };

    ServiceContext {
        name: name.to_string(),
        language,
        description: info.description,
        criticality: or(profile.criticality, "medium"),
        business_value: or(profile.business_value, "internal"),
        owner: or(profile.owner, UNKNOWN),
        dependencies: info.dependencies,
        grpc_methods: sources.api_surface.get(name).cloned().unwrap_or_default(),
        slo: SloTargets {
            availability: or(profile.availability, NOT_SET),
            latency_p99: or(profile.latency_p99, NOT_SET),
            error_budget: or(profile.error_budget, NOT_SET),
            throughput: or(profile.throughput, NOT_SET),
        },
        risks: profile.risks,
        alert_channels: profile.alert_channels,
        infra: sources.deployments.get(name).cloned().unwrap_or_default(),
    }
}

/// Build contexts for every service in the taxonomy.
pub fn build_contexts(
    taxonomy: &ServiceTaxonomy,
    sources: &SourceData,
) -> BTreeMap<String, ServiceContext> {
    taxonomy
        .services()
        .map(|name| (name.to_string(), merge_context(name, taxonomy, sources)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::taxonomy::{ServiceInfo, Tier};

    #[test]
    fn missing_sources_use_defaults() {
        let mut taxonomy = ServiceTaxonomy::new();
        taxonomy.insert("ghost", Tier::Low, ServiceInfo::default());
        let ctx = merge_context("ghost", &taxonomy, &SourceData::default());
        assert_eq!(ctx.language, UNKNOWN);
        assert_eq!(ctx.criticality, "medium");
        assert_eq!(ctx.business_value, "internal");
        assert_eq!(ctx.owner, UNKNOWN);
        assert_eq!(ctx.slo.latency_p99, NOT_SET);
        assert!(ctx.grpc_methods.is_empty());
        assert_eq!(ctx.infra, InfraFacts::default());
    }

    #[test]
    fn sources_override_defaults() {
        let taxonomy = ServiceTaxonomy::online_boutique();
        let mut sources = SourceData::default();
        sources.profiles.insert(
            "cartservice".into(),
            RiskProfile {
                criticality: Some("critical".into()),
                availability: Some("99.95".into()),
                risks: vec![Risk {
                    priority: "P1".into(),
                    description: "Redis outage".into(),
                }],
                ..RiskProfile::default()
            },
        );
        sources
            .api_surface
            .insert("cartservice".into(), vec!["AddItem".into(), "GetCart".into()]);
        sources.deployments.insert(
            "cartservice".into(),
            InfraFacts {
                port: Some(7070),
                probe: Some(ProbeKind::Grpc),
                ..InfraFacts::default()
            },
        );

        let ctx = merge_context("cartservice", &taxonomy, &sources);
        assert_eq!(ctx.language, "C#");
        assert_eq!(ctx.criticality, "critical");
        assert_eq!(ctx.slo.availability, "99.95");
        assert_eq!(ctx.slo.throughput, NOT_SET);
        assert_eq!(ctx.grpc_methods, ["AddItem", "GetCart"]);
        assert_eq!(ctx.infra.port, Some(7070));
        assert_eq!(ctx.risks.len(), 1);
    }

    #[test]
    fn contexts_cover_every_service() {
        let taxonomy = ServiceTaxonomy::online_boutique();
        let contexts = build_contexts(&taxonomy, &SourceData::default());
        assert_eq!(contexts.len(), 11);
        assert_eq!(contexts["frontend"].dependencies.len(), 7);
    }
}
