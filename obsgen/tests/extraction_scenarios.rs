//! End-to-end extraction scenarios against a temporary output root.

use obsgen::core::types::{IgnoreReason, TruncationWarning};
use obsgen::io::extractor::ArtifactExtractor;
use obsgen::test_support::{ScriptedCompiler, TestWorkspace, services};

#[test]
fn single_service_dashboard_lands_at_its_route() {
    let ws = TestWorkspace::new();
    let compiler = ScriptedCompiler::succeeding();
    let extractor = ArtifactExtractor::new(ws.layout(), &compiler);

    let report = extractor
        .extract(
            "OB-FRONTEND-DASHBOARDS",
            "--- DASHBOARD: frontend ---\n{\"title\":\"x\"}\nSome trailing prose".into(),
            &services(&["frontend"]),
        )
        .expect("extract");

    assert_eq!(report.saved_count(), 1);
    assert_eq!(ws.read("dashboards/frontend-dashboard.json"), "{\"title\":\"x\"}\n");
}

#[test]
fn three_of_four_alert_blocks_warn_about_truncation() {
    let ws = TestWorkspace::new();
    let compiler = ScriptedCompiler::succeeding();
    let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
    let text = "\
--- PROMETHEUS_RULE: checkoutservice ---
groups: [checkout]
--- PROMETHEUS_RULE: frontend ---
groups: [frontend]
--- PROMETHEUS_RULE: paymentservice ---
groups: [payment]
";
    let expected = services(&[
        "checkoutservice",
        "frontend",
        "paymentservice",
        "currencyservice",
    ]);

    let report = extractor
        .extract("OB-CRIT-ALERTS", text.into(), &expected)
        .expect("extract");

    assert_eq!(report.saved_count(), 3);
    assert_eq!(
        report.truncation,
        Some(TruncationWarning {
            expected: 4,
            saved: 3
        })
    );
    assert!(ws.path("prometheus-rules/paymentservice-rules.yaml").is_file());
    assert!(!ws.path("prometheus-rules/currencyservice-rules.yaml").exists());
}

#[test]
fn blocks_round_trip_in_any_order() {
    let ws = TestWorkspace::new();
    let compiler = ScriptedCompiler::succeeding();
    let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
    let text = "\
--- RUNBOOK: zeta ---
# Zeta runbook
--- RUNBOOK: alpha ---
# Alpha runbook
--- RUNBOOK: mid ---
# Mid runbook
";
    let report = extractor
        .extract("OB-MED-RUNBOOKS", text.into(), &services(&["alpha", "mid", "zeta"]))
        .expect("extract");

    assert_eq!(report.saved_count(), 3);
    assert!(report.truncation.is_none());
    for name in ["alpha", "mid", "zeta"] {
        let body = ws.read(&format!("runbooks/{name}-runbook.md"));
        assert!(body.to_lowercase().contains(&format!("# {name} runbook")), "{body}");
    }
}

#[test]
fn fenced_and_unfenced_blocks_save_identically() {
    let ws = TestWorkspace::new();
    let compiler = ScriptedCompiler::succeeding();
    let extractor = ArtifactExtractor::new(ws.layout(), &compiler);
    let text = "\
--- SLO: fenced ---
```yaml
slo: 99.9
```
--- SLO: plain ---
slo: 99.9
";
    extractor
        .extract("OB-HIGH-SLOS", text.into(), &services(&["fenced", "plain"]))
        .expect("extract");

    assert_eq!(
        ws.read("slo-definitions/fenced-slo.yaml"),
        ws.read("slo-definitions/plain-slo.yaml")
    );
}

#[test]
fn trailing_commentary_after_json_is_dropped() {
    let ws = TestWorkspace::new();
    let compiler = ScriptedCompiler::succeeding();
    let extractor = ArtifactExtractor::new(ws.layout(), &compiler);

    extractor
        .extract(
            "OB-CART-DASHBOARDS",
            "--- DASHBOARD: cartservice ---\n{\"a\":1}\nEXTRA COMMENTARY\n".into(),
            &services(&["cartservice"]),
        )
        .expect("extract");

    assert_eq!(ws.read("dashboards/cartservice-dashboard.json"), "{\"a\":1}\n");
}

#[test]
fn yaml_notes_section_is_cut() {
    let ws = TestWorkspace::new();
    let compiler = ScriptedCompiler::succeeding();
    let extractor = ArtifactExtractor::new(ws.layout(), &compiler);

    extractor
        .extract(
            "OB-CART-LOKI-RULES",
            "--- LOKI_RULE: cartservice ---\ngroups: []\n## Notes\nsee above\n".into(),
            &services(&["cartservice"]),
        )
        .expect("extract");

    assert_eq!(ws.read("loki-rules/cartservice-loki-rules.yaml"), "groups: []\n");
}

#[test]
fn whole_output_is_used_for_a_single_expected_service() {
    let ws = TestWorkspace::new();
    let compiler = ScriptedCompiler::succeeding();
    let extractor = ArtifactExtractor::new(ws.layout(), &compiler);

    let report = extractor
        .extract(
            "OB-LOW-RUNBOOK",
            "# loadgenerator runbook\n".into(),
            &services(&["loadgenerator"]),
        )
        .expect("extract");

    assert_eq!(report.ignored, None::<IgnoreReason>);
    assert_eq!(
        ws.read("runbooks/loadgenerator-runbook.md"),
        "# loadgenerator runbook\n"
    );
}
