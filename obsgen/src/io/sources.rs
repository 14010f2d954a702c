//! Loaders for the optional data sources behind service contexts.
//!
//! Every loader is best-effort: a missing path yields an empty result and an
//! unreadable or malformed file is skipped with a warning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use tracing::{debug, warn};

use crate::core::context::{InfraFacts, ProbeKind, ResourceSpec, Risk, RiskProfile, SourceData};
use crate::core::taxonomy::{ServiceInfo, ServiceTaxonomy, Tier};
use crate::io::config::SourcesConfig;

static PROTO_SERVICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)service\s+(\w+)\s*\{(.*?)^\}").expect("service regex should compile")
});
static PROTO_RPC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rpc\s+(\w+)\s*\(").expect("rpc regex should compile"));

const SKIPPED_MANIFESTS: [&str; 1] = ["kustomization.yaml"];

/// Load every configured source.
pub fn load_sources(cfg: &SourcesConfig) -> SourceData {
    SourceData {
        profiles: cfg
            .project_contexts_dir
            .as_deref()
            .map(load_project_contexts)
            .unwrap_or_default(),
        api_surface: cfg
            .proto_file
            .as_deref()
            .map(load_proto_services)
            .unwrap_or_default(),
        deployments: cfg
            .manifests_dir
            .as_deref()
            .map(load_manifests)
            .unwrap_or_default(),
    }
}

/// Load the configured taxonomy, or the built-in one.
pub fn load_taxonomy(cfg: &SourcesConfig) -> ServiceTaxonomy {
    match cfg.taxonomy_file.as_deref() {
        Some(path) => load_taxonomy_file(path).unwrap_or_else(ServiceTaxonomy::online_boutique),
        None => ServiceTaxonomy::online_boutique(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectContextDoc {
    spec: ProjectContextSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectContextSpec {
    business: BusinessSection,
    requirements: RequirementsSection,
    risks: Vec<YamlValue>,
    observability: ObservabilitySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BusinessSection {
    criticality: Option<YamlValue>,
    value: Option<YamlValue>,
    owner: Option<YamlValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RequirementsSection {
    availability: Option<YamlValue>,
    latency_p99: Option<YamlValue>,
    error_budget: Option<YamlValue>,
    throughput: Option<YamlValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ObservabilitySection {
    alert_channels: Vec<YamlValue>,
}

/// ProjectContext CRDs, keyed by file stem.
pub fn load_project_contexts(dir: &Path) -> BTreeMap<String, RiskProfile> {
    let mut profiles = BTreeMap::new();
    for path in yaml_files(dir) {
        let Some(contents) = read_source(&path) else {
            continue;
        };
        let doc: ProjectContextDoc = match serde_yaml::from_str(&contents) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(path = %path.display(), err = %err, "skipping malformed project context");
                continue;
            }
        };
        let spec = doc.spec;
        let profile = RiskProfile {
            criticality: spec.business.criticality.as_ref().and_then(scalar),
            business_value: spec.business.value.as_ref().and_then(scalar),
            owner: spec.business.owner.as_ref().and_then(scalar),
            availability: spec.requirements.availability.as_ref().and_then(scalar),
            latency_p99: spec.requirements.latency_p99.as_ref().and_then(scalar),
            error_budget: spec.requirements.error_budget.as_ref().and_then(scalar),
            throughput: spec.requirements.throughput.as_ref().and_then(scalar),
            risks: spec.risks.iter().filter_map(risk).collect(),
            alert_channels: spec
                .observability
                .alert_channels
                .iter()
                .filter_map(scalar)
                .collect(),
        };
        profiles.insert(file_stem(&path), profile);
    }
    debug!(count = profiles.len(), "loaded project contexts");
    profiles
}

/// gRPC method names per service, keyed by lower-cased proto service name.
pub fn load_proto_services(path: &Path) -> BTreeMap<String, Vec<String>> {
    let Some(contents) = read_source(path) else {
        return BTreeMap::new();
    };
    let services = parse_proto_services(&contents);
    debug!(count = services.len(), "loaded proto services");
    services
}

pub fn parse_proto_services(contents: &str) -> BTreeMap<String, Vec<String>> {
    PROTO_SERVICE_RE
        .captures_iter(contents)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_lowercase();
            let body = caps.get(2)?.as_str();
            let methods = PROTO_RPC_RE
                .captures_iter(body)
                .filter_map(|rpc| rpc.get(1).map(|m| m.as_str().to_string()))
                .collect();
            Some((name, methods))
        })
        .collect()
}

/// Deployment facts per manifest file stem.
pub fn load_manifests(dir: &Path) -> BTreeMap<String, InfraFacts> {
    let mut deployments = BTreeMap::new();
    for path in yaml_files(dir) {
        let skipped = path
            .file_name()
            .is_some_and(|name| SKIPPED_MANIFESTS.iter().any(|s| name == *s));
        if skipped {
            continue;
        }
        let Some(contents) = read_source(&path) else {
            continue;
        };
        match parse_manifest(&contents) {
            Ok(facts) => {
                deployments.insert(file_stem(&path), facts);
            }
            Err(err) => {
                warn!(path = %path.display(), err = %err, "skipping malformed manifest");
            }
        }
    }
    debug!(count = deployments.len(), "loaded deployment manifests");
    deployments
}

/// Extract facts from the first container of each Deployment document.
/// Later Deployments in the same file overwrite earlier ones.
pub fn parse_manifest(contents: &str) -> Result<InfraFacts, serde_yaml::Error> {
    let mut facts = InfraFacts::default();
    for document in serde_yaml::Deserializer::from_str(contents) {
        let doc = YamlValue::deserialize(document)?;
        if doc.get("kind").and_then(YamlValue::as_str) != Some("Deployment") {
            continue;
        }
        let container = &doc["spec"]["template"]["spec"]["containers"][0];
        if container.is_null() {
            continue;
        }

        facts.port = container["ports"][0]["containerPort"]
            .as_u64()
            .and_then(|port| u16::try_from(port).ok());
        facts.requests = resource_spec(&container["resources"]["requests"]);
        facts.limits = resource_spec(&container["resources"]["limits"]);
        facts.probe = ["readinessProbe", "livenessProbe"]
            .iter()
            .find_map(|key| probe_kind(&container[*key]));
    }
    Ok(facts)
}

fn resource_spec(value: &YamlValue) -> ResourceSpec {
    ResourceSpec {
        cpu: value.get("cpu").and_then(scalar),
        memory: value.get("memory").and_then(scalar),
    }
}

fn probe_kind(probe: &YamlValue) -> Option<ProbeKind> {
    if probe.get("httpGet").is_some() {
        Some(ProbeKind::Http)
    } else if probe.get("grpc").is_some() {
        Some(ProbeKind::Grpc)
    } else if probe.get("exec").is_some() {
        Some(ProbeKind::Exec)
    } else {
        None
    }
}

fn risk(value: &YamlValue) -> Option<Risk> {
    if !value.is_mapping() {
        return None;
    }
    Some(Risk {
        priority: value.get("priority").and_then(scalar).unwrap_or_else(|| "?".to_string()),
        description: value.get("description").and_then(scalar).unwrap_or_default(),
    })
}

/// Render a YAML scalar as text; numbers keep their written form.
fn scalar(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Taxonomy file: an array of `[[service]]` tables.
///
/// Entries are read one at a time; a malformed field falls back to its
/// default and an entry without a name is dropped. Returns `None` when the
/// file cannot be read or parsed at all.
pub fn load_taxonomy_file(path: &Path) -> Option<ServiceTaxonomy> {
    let contents = read_source(path)?;
    let table: toml::Table = match toml::from_str(&contents) {
        Ok(table) => table,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "taxonomy file unparseable, using built-in");
            return None;
        }
    };

    let mut taxonomy = ServiceTaxonomy::new();
    let entries = table
        .get("service")
        .and_then(toml::Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    for (index, entry) in entries.iter().enumerate() {
        let Some(name) = entry.get("name").and_then(toml::Value::as_str) else {
            warn!(index, "taxonomy entry without a name, skipping");
            continue;
        };
        let tier = match entry.get("tier").and_then(toml::Value::as_str) {
            Some(raw) => Tier::from_name(raw).unwrap_or_else(|| {
                warn!(service = name, tier = raw, "unknown tier, defaulting to medium");
                Tier::Medium
            }),
            None => {
                warn!(service = name, "taxonomy entry without tier, defaulting to medium");
                Tier::Medium
            }
        };
        let text = |key: &str| {
            entry
                .get(key)
                .and_then(toml::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let info = ServiceInfo {
            language: text("language"),
            description: text("description"),
            dependencies: entry
                .get("dependencies")
                .and_then(toml::Value::as_array)
                .map(|deps| {
                    deps.iter()
                        .filter_map(toml::Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };
        if !taxonomy.insert(name, tier, info) {
            warn!(service = name, "service listed twice, keeping first tier");
        }
    }
    debug!(count = taxonomy.len(), "loaded taxonomy file");
    Some(taxonomy)
}

fn read_source(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "skipping unreadable source");
            None
        }
    }
}

/// `*.yaml` files directly under `dir`, sorted by name.
fn yaml_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), err = %err, "skipping unreadable source directory");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "yaml"))
        .collect();
    files.sort();
    files
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
