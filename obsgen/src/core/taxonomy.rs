//! Service taxonomy: which services exist and which criticality tier owns them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::router::ArtifactCode;
use super::task_id::TaskId;

/// Criticality tier. Declaration order is traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Critical,
    High,
    Medium,
    Low,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Critical, Tier::High, Tier::Medium, Tier::Low];

    /// Scope segment used in batched task ids.
    pub fn code(self) -> &'static str {
        match self {
            Tier::Critical => "CRIT",
            Tier::High => "HIGH",
            Tier::Medium => "MED",
            Tier::Low => "LOW",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Tier::ALL.into_iter().find(|tier| tier.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn phase(self) -> u32 {
        match self {
            Tier::Critical => 1,
            Tier::High => 2,
            Tier::Medium => 3,
            Tier::Low => 4,
        }
    }

    pub fn artifact_codes(self) -> &'static [ArtifactCode] {
        match self {
            Tier::Low => &ArtifactCode::REDUCED,
            _ => &ArtifactCode::STANDARD,
        }
    }
}

/// Static per-service facts that no data source provides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub language: String,
    pub description: String,
    pub dependencies: Vec<String>,
}

impl ServiceInfo {
    fn new(language: &str, description: &str, dependencies: &[&str]) -> Self {
        Self {
            language: language.to_string(),
            description: description.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Service-to-tier assignment plus static info.
///
/// Each service belongs to exactly one tier; the first assignment wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceTaxonomy {
    tiers: BTreeMap<Tier, Vec<String>>,
    info: BTreeMap<String, ServiceInfo>,
}

impl ServiceTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `name` to `tier`. Returns `false` when the service already
    /// belongs to a tier; the existing assignment is kept.
    pub fn insert(&mut self, name: &str, tier: Tier, info: ServiceInfo) -> bool {
        if self.tier_of(name).is_some() {
            return false;
        }
        self.tiers.entry(tier).or_default().push(name.to_string());
        self.info.insert(name.to_string(), info);
        true
    }

    /// The eleven-service Online Boutique demo.
    pub fn online_boutique() -> Self {
        let entries: [(&str, Tier, ServiceInfo); 11] = [
            (
                "frontend",
                Tier::Critical,
                ServiceInfo::new(
                    "Go",
                    "HTTP server delivering the website interface",
                    &[
                        "productcatalogservice",
                        "currencyservice",
                        "cartservice",
                        "recommendationservice",
                        "shippingservice",
                        "checkoutservice",
                        "adservice",
                    ],
                ),
            ),
            (
                "checkoutservice",
                Tier::Critical,
                ServiceInfo::new(
                    "Go",
                    "Orchestrates purchase workflow",
                    &[
                        "productcatalogservice",
                        "cartservice",
                        "currencyservice",
                        "shippingservice",
                        "paymentservice",
                        "emailservice",
                    ],
                ),
            ),
            (
                "cartservice",
                Tier::Critical,
                ServiceInfo::new("C#", "Manages shopping cart with Redis backend", &[]),
            ),
            (
                "paymentservice",
                Tier::Critical,
                ServiceInfo::new("Node.js", "Processes mock credit card transactions", &[]),
            ),
            (
                "productcatalogservice",
                Tier::High,
                ServiceInfo::new("Go", "Product catalog from JSON with search", &[]),
            ),
            (
                "currencyservice",
                Tier::High,
                ServiceInfo::new("Node.js", "Currency conversion using ECB rates", &[]),
            ),
            (
                "shippingservice",
                Tier::High,
                ServiceInfo::new("Go", "Calculates shipping estimates", &[]),
            ),
            (
                "emailservice",
                Tier::Medium,
                ServiceInfo::new("Python", "Sends mock order confirmation emails", &[]),
            ),
            (
                "recommendationservice",
                Tier::Medium,
                ServiceInfo::new(
                    "Python",
                    "Product recommendations based on cart",
                    &["productcatalogservice"],
                ),
            ),
            (
                "adservice",
                Tier::Medium,
                ServiceInfo::new("Java", "Contextual text advertisements", &[]),
            ),
            (
                "loadgenerator",
                Tier::Low,
                ServiceInfo::new(
                    "Python",
                    "Simulates user shopping behavior with Locust",
                    &["frontend"],
                ),
            ),
        ];

        let mut taxonomy = Self::new();
        for (name, tier, info) in entries {
            taxonomy.insert(name, tier, info);
        }
        taxonomy
    }

    /// Members of a tier in insertion order. Empty when the tier has none.
    pub fn members(&self, tier: Tier) -> &[String] {
        self.tiers.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn info(&self, name: &str) -> Option<&ServiceInfo> {
        self.info.get(name)
    }

    pub fn tier_of(&self, name: &str) -> Option<Tier> {
        self.tiers
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == name))
            .map(|(tier, _)| *tier)
    }

    /// Every service in tier order.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        Tier::ALL
            .into_iter()
            .flat_map(|tier| self.members(tier).iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Resolve the services a task is expected to produce artifacts for.
    ///
    /// A tier scope yields the tier's members; a service scope yields that
    /// service. Unknown scopes yield nothing.
    pub fn expected_services(&self, task_id: &TaskId) -> Vec<String> {
        if let Some(tier) = Tier::from_code(task_id.scope()) {
            return self.members(tier).to_vec();
        }
        self.services()
            .find(|name| scope_token(name) == task_id.scope())
            .map(|name| vec![name.to_string()])
            .unwrap_or_default()
    }
}

/// Task-id scope segment for a service name.
///
/// Dashes are replaced because the id grammar splits on the first two.
pub fn scope_token(service: &str) -> String {
    service.to_uppercase().replace('-', "_")
}
