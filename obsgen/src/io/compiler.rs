//! Secondary compilation of parameter documents through Jsonnet factories.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::router::{CompileFactory, ContentFormat};
use crate::io::config::CompilerConfig;
use crate::io::process::{is_not_found, run_command_with_timeout};

/// Characters of compiler stderr kept in failure messages.
const STDERR_PREVIEW_CHARS: usize = 200;

/// Why a parameter document did not produce its final artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileFailure {
    #[error("no compiler binary found (tried {})", .tried.join(", "))]
    MissingBinary { tried: Vec<String> },

    #[error("factory template not found: {}", .path.display())]
    MissingTemplate { path: PathBuf },

    #[error("{binary} exited with {code:?}: {stderr}")]
    NonZeroExit {
        binary: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{binary} reported errors: {stderr}")]
    Stderr { binary: String, stderr: String },

    #[error("{binary} timed out after {secs}s")]
    Timeout { binary: String, secs: u64 },

    #[error("{binary} failed to run: {message}")]
    Spawn { binary: String, message: String },
}

/// Turns a saved parameter document into final artifact text.
pub trait ParamCompiler {
    fn compile(&self, params: &Path, factory: CompileFactory) -> Result<String, CompileFailure>;
}

/// Runs the Jsonnet CLI against `<mixin>/services/<factory>.libsonnet`.
#[derive(Debug, Clone)]
pub struct JsonnetCompiler {
    binaries: Vec<String>,
    mixin_dir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl JsonnetCompiler {
    pub fn from_config(cfg: &CompilerConfig) -> Self {
        Self {
            binaries: cfg.binaries.clone(),
            mixin_dir: cfg.mixin_dir.clone(),
            timeout: cfg.timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn factory_path(&self, factory: CompileFactory) -> PathBuf {
        self.mixin_dir
            .join("services")
            .join(format!("{}.libsonnet", factory.name))
    }

    fn command(&self, binary: &str, template: &Path, params: &Path, yaml: bool) -> Command {
        let mut cmd = Command::new(binary);
        cmd.arg("-J").arg(self.mixin_dir.join("vendor"));
        if yaml {
            cmd.arg("-S");
        }
        cmd.arg("-e").arg(expression(template, params, yaml));
        cmd
    }
}

/// Jsonnet snippet applying the factory to the parameter document.
pub fn expression(template: &Path, params: &Path, yaml: bool) -> String {
    let body = if yaml {
        "std.manifestYamlDoc(f(s))"
    } else {
        "f(s)"
    };
    format!(
        "local f = import \"{}\"; local s = import \"{}\"; {body}",
        template.display(),
        params.display()
    )
}

impl ParamCompiler for JsonnetCompiler {
    #[instrument(skip_all, fields(factory = factory.name, params = %params.display()))]
    fn compile(&self, params: &Path, factory: CompileFactory) -> Result<String, CompileFailure> {
        let template = self.factory_path(factory);
        if !template.is_file() {
            warn!(path = %template.display(), "factory template not found");
            return Err(CompileFailure::MissingTemplate { path: template });
        }
        let yaml = factory.format == ContentFormat::Yaml;

        for binary in &self.binaries {
            let cmd = self.command(binary, &template, params, yaml);
            let output = match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            {
                Ok(output) => output,
                Err(err) if is_not_found(&err) => {
                    debug!(binary = %binary, "compiler binary not found, trying next");
                    continue;
                }
                Err(err) => {
                    return Err(CompileFailure::Spawn {
                        binary: binary.clone(),
                        message: format!("{err:#}"),
                    });
                }
            };

            let stderr = preview(&output.stderr);
            if output.timed_out {
                return Err(CompileFailure::Timeout {
                    binary: binary.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
            if !output.status.success() {
                return Err(CompileFailure::NonZeroExit {
                    binary: binary.clone(),
                    code: output.status.code(),
                    stderr,
                });
            }
            if !stderr.is_empty() {
                return Err(CompileFailure::Stderr {
                    binary: binary.clone(),
                    stderr,
                });
            }
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        Err(CompileFailure::MissingBinary {
            tried: self.binaries.clone(),
        })
    }
}

fn preview(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .trim()
        .chars()
        .take(STDERR_PREVIEW_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(format: ContentFormat) -> CompileFactory {
        CompileFactory {
            name: "alerts",
            format,
        }
    }

    fn compiler(mixin: &Path, binaries: &[&str]) -> JsonnetCompiler {
        JsonnetCompiler::from_config(&CompilerConfig {
            binaries: binaries.iter().map(|b| b.to_string()).collect(),
            mixin_dir: mixin.to_path_buf(),
            timeout_secs: 5,
            output_limit_bytes: 1024,
        })
    }

    #[test]
    fn yaml_expression_wraps_manifest() {
        let expr = expression(
            Path::new("m/services/alerts.libsonnet"),
            Path::new("p.libsonnet"),
            true,
        );
        assert_eq!(
            expr,
            "local f = import \"m/services/alerts.libsonnet\"; local s = import \"p.libsonnet\"; std.manifestYamlDoc(f(s))"
        );
        let json = expression(Path::new("t"), Path::new("p"), false);
        assert!(json.ends_with("; f(s)"));
    }

    #[test]
    fn missing_template_is_reported_before_spawning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = compiler(temp.path(), &["jsonnet"])
            .compile(&temp.path().join("p.libsonnet"), factory(ContentFormat::Yaml))
            .expect_err("no template");
        assert!(matches!(err, CompileFailure::MissingTemplate { .. }));
    }

    #[test]
    fn missing_binaries_fall_through() {
        let temp = tempfile::tempdir().expect("tempdir");
        let services = temp.path().join("services");
        std::fs::create_dir_all(&services).expect("mkdir");
        std::fs::write(services.join("alerts.libsonnet"), "function(s) s").expect("write");

        let err = compiler(temp.path(), &["obsgen-missing-a", "obsgen-missing-b"])
            .compile(&temp.path().join("p.libsonnet"), factory(ContentFormat::Json))
            .expect_err("no binary");
        assert_eq!(
            err,
            CompileFailure::MissingBinary {
                tried: vec!["obsgen-missing-a".into(), "obsgen-missing-b".into()],
            }
        );
    }

    #[test]
    fn stderr_preview_is_bounded() {
        let long = "e".repeat(500);
        assert_eq!(preview(long.as_bytes()).len(), STDERR_PREVIEW_CHARS);
    }
}
