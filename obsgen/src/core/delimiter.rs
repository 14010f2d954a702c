//! Delimiter scanning for multi-artifact completions.
//!
//! A completion carries one artifact per `--- TOKEN: service ---` line. Each
//! match owns the body text up to the next marker (or the end of input).

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^---[ \t]*(\w+):[ \t]*(\S+)[ \t]*---[ \t]*\r?$")
        .expect("delimiter regex should compile")
});

/// One delimiter line plus the body it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterMatch {
    pub declared_type: String,
    pub service: String,
    pub marker: Range<usize>,
    pub body: Range<usize>,
}

impl DelimiterMatch {
    pub fn body_text<'a>(&self, text: &'a str) -> &'a str {
        &text[self.body.clone()]
    }
}

/// Find every delimiter line in `text`, ordered by position.
///
/// No filtering by type happens here; bodies are computed from marker
/// positions alone, so they never overlap.
pub fn scan(text: &str) -> Vec<DelimiterMatch> {
    let mut matches: Vec<DelimiterMatch> = MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(DelimiterMatch {
                declared_type: caps.get(1)?.as_str().to_string(),
                service: caps.get(2)?.as_str().to_string(),
                marker: whole.range(),
                body: whole.end()..text.len(),
            })
        })
        .collect();

    for i in 1..matches.len() {
        let next_start = matches[i].marker.start;
        matches[i - 1].body.end = next_start;
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_run_to_next_marker() {
        let text = "--- DASHBOARD: frontend ---\n{\"a\":1}\n--- DASHBOARD: cartservice ---\n{\"b\":2}\n";
        let found = scan(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].service, "frontend");
        assert_eq!(found[0].body_text(text).trim(), "{\"a\":1}");
        assert_eq!(found[1].service, "cartservice");
        assert_eq!(found[1].body_text(text).trim(), "{\"b\":2}");
        assert_eq!(found[0].body.end, found[1].marker.start);
    }

    #[test]
    fn tolerates_tabs_and_carriage_returns() {
        let text = "---\tSLO:\tpaymentservice\t---\r\nbody\r\n";
        let found = scan(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].declared_type, "SLO");
        assert_eq!(found[0].service, "paymentservice");
    }

    #[test]
    fn marker_must_fill_the_line() {
        assert!(scan("text --- SLO: x ---\n").is_empty());
        assert!(scan("--- SLO: x --- trailing\n").is_empty());
        assert!(scan("--- SLO: two words ---\n").is_empty());
        assert!(scan("no markers at all").is_empty());
    }

    #[test]
    fn type_token_is_case_sensitive_and_unfiltered() {
        let found = scan("--- slo: a ---\nx\n--- RUNBOOK: b ---\ny");
        let types: Vec<_> = found.iter().map(|m| m.declared_type.as_str()).collect();
        assert_eq!(types, vec!["slo", "RUNBOOK"]);
    }
}
