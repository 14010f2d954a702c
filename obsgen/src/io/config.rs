//! Planner and extractor configuration stored in `obsgen.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::layout::write_atomic;

/// Top-level configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that
/// reproduce the Online Boutique demo layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObsgenConfig {
    /// Root of the generated artifact tree.
    pub output_dir: PathBuf,

    /// Directory holding one task-state JSON file per task.
    pub state_dir: PathBuf,

    pub project_id: String,
    pub sprint_id: String,

    pub sources: SourcesConfig,
    pub compiler: CompilerConfig,
}

/// Optional data sources merged into service contexts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourcesConfig {
    /// Directory of ProjectContext CRD YAML files, one per service.
    pub project_contexts_dir: Option<PathBuf>,
    /// Proto file declaring the gRPC services.
    pub proto_file: Option<PathBuf>,
    /// Directory of Kubernetes manifests, one file per service.
    pub manifests_dir: Option<PathBuf>,
    /// Replaces the built-in taxonomy when set.
    pub taxonomy_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Jsonnet binaries tried in order; a missing binary falls through.
    pub binaries: Vec<String>,

    /// Mixin root containing `vendor/` and `services/<factory>.libsonnet`.
    pub mixin_dir: PathBuf,

    pub timeout_secs: u64,

    /// Bound on captured compiler stdout/stderr.
    pub output_limit_bytes: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            binaries: vec!["jsonnet".to_string(), "go-jsonnet".to_string()],
            mixin_dir: PathBuf::from("mixin"),
            timeout_secs: 30,
            output_limit_bytes: 4 * 1024 * 1024,
        }
    }
}

impl CompilerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ObsgenConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output/observability"),
            state_dir: PathBuf::from(".obsgen/state"),
            project_id: "ecosystem-demo".to_string(),
            sprint_id: "demo-sprint-1".to_string(),
            sources: SourcesConfig::default(),
            compiler: CompilerConfig::default(),
        }
    }
}

impl ObsgenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.compiler.timeout_secs == 0 {
            return Err(anyhow!("compiler.timeout_secs must be > 0"));
        }
        if self.compiler.output_limit_bytes == 0 {
            return Err(anyhow!("compiler.output_limit_bytes must be > 0"));
        }
        if self.compiler.binaries.is_empty()
            || self.compiler.binaries.iter().any(|b| b.trim().is_empty())
        {
            return Err(anyhow!("compiler.binaries must be a non-empty array of names"));
        }
        if self.project_id.trim().is_empty() {
            return Err(anyhow!("project_id must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ObsgenConfig::default()`.
pub fn load_config(path: &Path) -> Result<ObsgenConfig> {
    if !path.exists() {
        let cfg = ObsgenConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ObsgenConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ObsgenConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    write_atomic(path, &buf)
}
