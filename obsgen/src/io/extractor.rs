//! Splits one completion into per-service artifact files.
//!
//! Extraction never fails on the shape of the payload: foreign ids, unknown
//! codes, missing markers, mismatched blocks and per-block write failures are
//! all reported in the [`ExtractionReport`]. Only failing to create the
//! output directory for the task's kind is an error.
//!
//! Every file is written with [`write_atomic`], so extracting distinct tasks
//! concurrently needs no coordination. Two writers targeting the same
//! (service, kind) file race as last-writer-wins; no reader sees a torn file.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::delimiter::{DelimiterMatch, scan};
use crate::core::payload::RawOutput;
use crate::core::router::{ArtifactCode, ArtifactKind, ContentFormat};
use crate::core::sanitize::sanitize;
use crate::core::task_id::TaskId;
use crate::core::types::{
    ArtifactFailure, CompileFailureRecord, ExtractionReport, IgnoreReason, SavedArtifact,
    SkipReason, SkippedBlock, TruncationWarning,
};
use crate::io::compiler::ParamCompiler;
use crate::io::layout::{OutputLayout, is_safe_service_name, write_atomic};

const PARAMS_TOKEN: &str = "PARAMS";
const PREVIEW_CHARS: usize = 200;

pub struct ArtifactExtractor<'a> {
    layout: &'a OutputLayout,
    compiler: &'a dyn ParamCompiler,
}

impl<'a> ArtifactExtractor<'a> {
    pub fn new(layout: &'a OutputLayout, compiler: &'a dyn ParamCompiler) -> Self {
        Self { layout, compiler }
    }

    /// Extract artifacts for `task_id` from `raw`.
    ///
    /// `expected_services` drives the single-service fallback and the
    /// truncation check. The check counts distinct expected services with a
    /// saved file, so a repeated block cannot mask a missing one.
    #[instrument(skip_all, fields(task_id = %task_id, expected = expected_services.len()))]
    pub fn extract(
        &self,
        task_id: &str,
        raw: RawOutput,
        expected_services: &[String],
    ) -> Result<ExtractionReport> {
        let wanted: BTreeSet<&str> = expected_services.iter().map(String::as_str).collect();
        let expected = wanted.len();
        let Some(id) = TaskId::parse(task_id) else {
            debug!("not an artifact task id");
            return Ok(ExtractionReport::ignored(
                task_id,
                None,
                expected,
                IgnoreReason::ForeignTaskId,
            ));
        };
        let Some(code) = id.artifact_code() else {
            debug!(code = id.code(), "unknown artifact code");
            return Ok(ExtractionReport::ignored(
                task_id,
                None,
                expected,
                IgnoreReason::UnknownArtifactCode,
            ));
        };
        let kind = code.kind();
        let Some(text) = raw.into_text() else {
            debug!("empty output");
            return Ok(ExtractionReport::ignored(
                task_id,
                Some(kind),
                expected,
                IgnoreReason::EmptyOutput,
            ));
        };

        let mut report = ExtractionReport::new(task_id, Some(kind), expected);
        let matches = scan(&text);

        if matches.is_empty() {
            if let [service] = expected_services {
                self.save_whole(&mut report, kind, service, &text)?;
            } else {
                let preview: String = text.chars().take(PREVIEW_CHARS).collect();
                debug!(len = text.len(), preview = %preview.replace('\n', "\\n"), "no delimiters found");
                report.ignored = Some(IgnoreReason::NoDelimiters);
                return Ok(report);
            }
        } else if code == ArtifactCode::Params || matches.iter().any(is_params) {
            self.save_params(&mut report, kind, &text, &matches)?;
        } else {
            self.save_raw(&mut report, kind, &text, &matches)?;
        }

        let covered = report
            .saved
            .iter()
            .map(|artifact| artifact.service.as_str())
            .filter(|service| wanted.contains(service))
            .collect::<BTreeSet<_>>()
            .len();
        if expected > covered {
            warn!(expected, saved = covered, "fewer services than expected, output may be truncated");
            report.truncation = Some(TruncationWarning {
                expected,
                saved: covered,
            });
        }
        info!(
            saved = report.saved_count(),
            compiled = report.compiled_count(),
            skipped = report.skipped.len(),
            failures = report.failures.len(),
            "extraction finished"
        );
        Ok(report)
    }

    /// Single-service fallback: the whole text is the artifact.
    fn save_whole(
        &self,
        report: &mut ExtractionReport,
        kind: ArtifactKind,
        service: &str,
        text: &str,
    ) -> Result<()> {
        self.layout.ensure_kind_dir(kind)?;
        if !is_safe_service_name(service) {
            report.skipped.push(skipped("", service, SkipReason::UnsafeServiceName));
            return Ok(());
        }
        let content = sanitize(text, kind.format());
        if content.is_empty() {
            report.skipped.push(skipped("", service, SkipReason::EmptyContent));
            return Ok(());
        }
        self.write(report, kind, service, &content);
        Ok(())
    }

    fn save_raw(
        &self,
        report: &mut ExtractionReport,
        kind: ArtifactKind,
        text: &str,
        matches: &[DelimiterMatch],
    ) -> Result<()> {
        self.layout.ensure_kind_dir(kind)?;
        let token = kind.delimiter_token();

        for block in matches {
            if block.declared_type != token {
                debug!(declared = %block.declared_type, expected = token, "skipping block of other type");
                report.skipped.push(block_skip(block, SkipReason::TypeMismatch));
                continue;
            }
            if !is_safe_service_name(&block.service) {
                warn!(service = %block.service, "unsafe service name in delimiter");
                report.skipped.push(block_skip(block, SkipReason::UnsafeServiceName));
                continue;
            }
            let content = sanitize(block.body_text(text), kind.format());
            if content.is_empty() {
                report.skipped.push(block_skip(block, SkipReason::EmptyContent));
                continue;
            }
            self.write(report, kind, &block.service, &content);
        }
        Ok(())
    }

    /// Save each PARAMS block as a parameter document, then run it through
    /// the parameter-document compiler when the task's kind has a factory.
    fn save_params(
        &self,
        report: &mut ExtractionReport,
        kind: ArtifactKind,
        text: &str,
        matches: &[DelimiterMatch],
    ) -> Result<()> {
        self.layout.ensure_kind_dir(ArtifactKind::ParameterDoc)?;
        let factory = kind.params_factory();
        if factory.is_some() {
            self.layout.ensure_kind_dir(kind)?;
        }

        for block in matches {
            if !is_params(block) {
                report.skipped.push(block_skip(block, SkipReason::TypeMismatch));
                continue;
            }
            if !is_safe_service_name(&block.service) {
                warn!(service = %block.service, "unsafe service name in delimiter");
                report.skipped.push(block_skip(block, SkipReason::UnsafeServiceName));
                continue;
            }
            let content = sanitize(block.body_text(text), ContentFormat::Literal);
            if content.is_empty() {
                report.skipped.push(block_skip(block, SkipReason::EmptyContent));
                continue;
            }
            if !self.write(report, ArtifactKind::ParameterDoc, &block.service, &content) {
                continue;
            }

            let Some(factory) = factory else {
                continue;
            };
            let params_path = self.layout.params_path(&block.service);
            match self.compiler.compile(&params_path, factory) {
                Ok(compiled) => {
                    let path = self.layout.artifact_path(kind, &block.service);
                    match write_atomic(&path, &compiled) {
                        Ok(()) => report.compiled.push(SavedArtifact {
                            service: block.service.clone(),
                            kind,
                            path,
                        }),
                        Err(err) => report.failures.push(ArtifactFailure {
                            service: block.service.clone(),
                            message: format!("{err:#}"),
                        }),
                    }
                }
                Err(failure) => {
                    warn!(service = %block.service, err = %failure, "compilation failed");
                    report.compile_failures.push(CompileFailureRecord {
                        service: block.service.clone(),
                        message: failure.to_string(),
                    });
                }
            }
        }

        let (saved, compiled) = (report.saved_count(), report.compiled_count());
        if saved > 0 && compiled < saved && factory.is_some() {
            info!(saved, compiled, "not every parameter document compiled");
        }
        Ok(())
    }

    /// Write one artifact, recording success or failure. Returns whether the
    /// file was written.
    fn write(
        &self,
        report: &mut ExtractionReport,
        kind: ArtifactKind,
        service: &str,
        content: &str,
    ) -> bool {
        let path = self.layout.artifact_path(kind, service);
        match write_atomic(&path, &format!("{content}\n")) {
            Ok(()) => {
                report.saved.push(SavedArtifact {
                    service: service.to_string(),
                    kind,
                    path,
                });
                true
            }
            Err(err) => {
                warn!(service, err = %format!("{err:#}"), "failed to write artifact");
                report.failures.push(ArtifactFailure {
                    service: service.to_string(),
                    message: format!("{err:#}"),
                });
                false
            }
        }
    }
}

fn is_params(block: &DelimiterMatch) -> bool {
    block.declared_type == PARAMS_TOKEN
}

fn block_skip(block: &DelimiterMatch, reason: SkipReason) -> SkippedBlock {
    skipped(&block.declared_type, &block.service, reason)
}

fn skipped(declared_type: &str, service: &str, reason: SkipReason) -> SkippedBlock {
    SkippedBlock {
        declared_type: declared_type.to_string(),
        service: service.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::{ScriptedCompiler, TestWorkspace, services};

    #[test]
    fn raw_blocks_are_saved_per_service() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let text = "--- SLO: cartservice ---\nslo: a\n--- SLO: frontend ---\nslo: b\n";
        let report = extractor
            .extract("OB-CRIT-SLOS", text.into(), &services(&["cartservice", "frontend"]))
            .expect("extract");

        assert_eq!(report.saved_count(), 2);
        assert!(report.truncation.is_none());
        let saved = ws.read("slo-definitions/frontend-slo.yaml");
        assert_eq!(saved, "slo: b\n");
    }

    #[test]
    fn mismatched_blocks_are_skipped() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let text = "--- SLO: cartservice ---\nslo: a\n--- RUNBOOK: cartservice ---\n# Runbook\n";
        let report = extractor
            .extract("OB-CART-SLOS", text.into(), &services(&["cartservice"]))
            .expect("extract");

        assert_eq!(report.saved_count(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::TypeMismatch);
        assert!(!ws.path("runbooks/cartservice-runbook.md").exists());
    }

    #[test]
    fn unsafe_service_names_never_escape() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let text = "--- RUNBOOK: ../../etc ---\n# x\n--- RUNBOOK: .. ---\n# y\n";
        let report = extractor
            .extract("OB-MED-RUNBOOKS", text.into(), &services(&["a", "b"]))
            .expect("extract");

        assert_eq!(report.saved_count(), 0);
        assert!(
            report
                .skipped
                .iter()
                .all(|s| s.reason == SkipReason::UnsafeServiceName)
        );
        assert_eq!(report.truncation, Some(TruncationWarning { expected: 2, saved: 0 }));
    }

    #[test]
    fn foreign_and_unknown_ids_are_ignored() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);

        let foreign = extractor
            .extract("PI-001", "--- SLO: a ---\nx".into(), &[])
            .expect("extract");
        assert_eq!(foreign.ignored, Some(IgnoreReason::ForeignTaskId));

        let unknown = extractor
            .extract("OB-CRIT-TRACES", "--- SLO: a ---\nx".into(), &[])
            .expect("extract");
        assert_eq!(unknown.ignored, Some(IgnoreReason::UnknownArtifactCode));
        assert_eq!(unknown.saved_count(), 0);
        assert!(fs::read_dir(ws.layout().root()).expect("list").next().is_none());
    }

    #[test]
    fn empty_payloads_are_ignored() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let report = extractor
            .extract(
                "OB-CRIT-SLOS",
                RawOutput::Opaque(serde_json::Value::Null),
                &services(&["x"]),
            )
            .expect("extract");
        assert_eq!(report.ignored, Some(IgnoreReason::EmptyOutput));
    }

    #[test]
    fn missing_delimiters_with_many_services_is_observable() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let report = extractor
            .extract("OB-HIGH-SLOS", "slo: a".into(), &services(&["a", "b"]))
            .expect("extract");
        assert_eq!(report.ignored, Some(IgnoreReason::NoDelimiters));
        assert_eq!(report.saved_count(), 0);
    }

    #[test]
    fn params_are_saved_and_compiled() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let text = "--- PARAMS: frontend ---\n```jsonnet\n{ name: 'frontend' }\n```\n--- PARAMS: cartservice ---\n{ name: 'cartservice' }\n";
        let report = extractor
            .extract(
                "OB-CRIT-DASHBOARDS",
                text.into(),
                &services(&["frontend", "cartservice"]),
            )
            .expect("extract");

        assert_eq!(report.saved_count(), 2);
        assert_eq!(report.compiled_count(), 2);
        assert_eq!(report.effective_count(), 2);
        assert_eq!(ws.read("params/frontend-params.libsonnet"), "{ name: 'frontend' }\n");
        assert!(ws.path("dashboards/cartservice-dashboard.json").is_file());
        assert_eq!(compiler.calls(), ["dashboard", "dashboard"]);
    }

    #[test]
    fn compile_failures_keep_params_on_disk() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::failing_for(&["cartservice"]);
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let text = "--- PARAMS: frontend ---\n{}\n--- PARAMS: cartservice ---\n{}\n";
        let report = extractor
            .extract(
                "OB-CRIT-ALERTS",
                text.into(),
                &services(&["frontend", "cartservice"]),
            )
            .expect("extract");

        assert_eq!(report.saved_count(), 2);
        assert_eq!(report.compiled_count(), 1);
        assert_eq!(report.effective_count(), 1);
        assert_eq!(report.compile_failures.len(), 1);
        assert_eq!(report.compile_failures[0].service, "cartservice");
        assert!(ws.path("params/cartservice-params.libsonnet").is_file());
        assert!(ws.path("prometheus-rules/frontend-rules.yaml").is_file());
        assert!(!ws.path("prometheus-rules/cartservice-rules.yaml").exists());
    }

    #[test]
    fn write_failure_does_not_stop_sibling_blocks() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        fs::create_dir_all(ws.path("dashboards/a-dashboard.json")).expect("blocking dir");
        let text = "--- DASHBOARD: a ---\n{\"a\":1}\n--- DASHBOARD: b ---\n{\"b\":2}\n";
        let report = extractor
            .extract("OB-HIGH-DASHBOARDS", text.into(), &services(&["a", "b"]))
            .expect("extract");

        assert_eq!(report.saved_count(), 1);
        assert_eq!(report.saved[0].service, "b");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].service, "a");
        assert_eq!(ws.read("dashboards/b-dashboard.json"), "{\"b\":2}\n");
        assert_eq!(report.truncation, Some(TruncationWarning { expected: 2, saved: 1 }));
    }

    #[test]
    fn repeated_blocks_do_not_hide_a_missing_service() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let text = "--- SLO: a ---\nslo: 1\n--- SLO: a ---\nslo: 2\n";
        let report = extractor
            .extract("OB-HIGH-SLOS", text.into(), &services(&["a", "b"]))
            .expect("extract");

        assert_eq!(report.saved_count(), 2);
        assert_eq!(report.truncation, Some(TruncationWarning { expected: 2, saved: 1 }));
        assert_eq!(ws.read("slo-definitions/a-slo.yaml"), "slo: 2\n");
    }

    #[test]
    fn params_tasks_are_save_only() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let report = extractor
            .extract(
                "OB-CRIT-PARAMS",
                "--- PARAMS: frontend ---\n{ name: 'frontend' }\n".into(),
                &services(&["frontend"]),
            )
            .expect("extract");

        assert_eq!(report.saved_count(), 1);
        assert_eq!(report.compiled_count(), 0);
        assert!(compiler.calls().is_empty());
        assert_eq!(ws.read("params/frontend-params.libsonnet"), "{ name: 'frontend' }\n");
    }

    #[test]
    fn runbook_params_are_saved_without_compiling() {
        let ws = TestWorkspace::new();
        let compiler = ScriptedCompiler::succeeding();
        let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
        let report = extractor
            .extract(
                "OB-LOW-RUNBOOK",
                "--- PARAMS: loadgenerator ---\n{}".into(),
                &services(&["loadgenerator"]),
            )
            .expect("extract");
        assert_eq!(report.saved_count(), 1);
        assert_eq!(report.compiled_count(), 0);
        assert!(compiler.calls().is_empty());
    }
}
