//! Test-only helpers: a temporary workspace and a scripted compiler.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use crate::core::router::{CompileFactory, ContentFormat};
use crate::io::compiler::{CompileFailure, ParamCompiler};
use crate::io::config::ObsgenConfig;
use crate::io::layout::OutputLayout;

/// Temporary directory with an artifact root at `<tmp>/out`.
pub struct TestWorkspace {
    temp: TempDir,
    layout: OutputLayout,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("out");
        fs::create_dir_all(&out).expect("create output root");
        Self {
            layout: OutputLayout::new(out),
            temp,
        }
    }

    /// Workspace root (parent of the artifact root).
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Path relative to the artifact root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.layout.root().join(rel)
    }

    /// Read a file relative to the artifact root.
    pub fn read(&self, rel: &str) -> String {
        let path = self.path(rel);
        fs::read_to_string(&path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
    }

    /// Default config pointed at this workspace.
    pub fn config(&self) -> ObsgenConfig {
        ObsgenConfig {
            output_dir: self.layout.root().to_path_buf(),
            state_dir: self.root().join("state"),
            ..ObsgenConfig::default()
        }
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned service-name list.
pub fn services(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Compiler double. Fails for the listed services (matched by the params
/// file stem) and records the factory of every call.
pub struct ScriptedCompiler {
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedCompiler {
    pub fn succeeding() -> Self {
        Self::failing_for(&[])
    }

    pub fn failing_for(services: &[&str]) -> Self {
        Self {
            failing: services.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl ParamCompiler for ScriptedCompiler {
    fn compile(&self, params: &Path, factory: CompileFactory) -> Result<String, CompileFailure> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(factory.name.to_string());
        let stem = params
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let service = stem.strip_suffix("-params").unwrap_or(&stem).to_string();
        if self.failing.contains(&service) {
            return Err(CompileFailure::NonZeroExit {
                binary: "jsonnet".to_string(),
                code: Some(1),
                stderr: format!("scripted failure for {service}"),
            });
        }
        Ok(match factory.format {
            ContentFormat::Json => format!("{{\"service\": \"{service}\"}}"),
            _ => format!("service: {service}"),
        })
    }
}
