//! Task id grammar: `OB-<SCOPE>-<ARTIFACT_CODE>`.

use std::fmt;

use super::router::{ArtifactCode, ArtifactKind};

/// Id family prefix for every task generated by the planner.
pub const FAMILY: &str = "OB";

/// Scopes reserved for synthesized tasks; they carry no artifact code.
pub const EPIC_ID: &str = "OB-EPIC";
pub const LOAD_ID: &str = "OB-LOAD";
pub const VERIFY_ID: &str = "OB-VERIFY";
pub const SUMMARY_ID: &str = "OB-SUMMARY";

/// A parsed artifact task id.
///
/// The split happens on the first two dashes only, so codes that themselves
/// contain dashes (`LOKI-RULES`) survive intact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    scope: String,
    code: String,
}

impl TaskId {
    /// Parse an artifact task id. Returns `None` for foreign or malformed ids
    /// and for the synthesized non-artifact tasks.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().splitn(3, '-');
        let family = parts.next()?;
        let scope = parts.next()?;
        let code = parts.next()?;
        if family != FAMILY || scope.is_empty() || code.is_empty() {
            return None;
        }
        Some(Self {
            scope: scope.to_string(),
            code: code.to_string(),
        })
    }

    pub fn new(scope: &str, code: ArtifactCode) -> Self {
        Self {
            scope: scope.to_string(),
            code: code.as_str().to_string(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Raw artifact code segment, which may be unknown to the router.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn artifact_code(&self) -> Option<ArtifactCode> {
        ArtifactCode::parse(&self.code)
    }

    pub fn kind(&self) -> Option<ArtifactKind> {
        self.artifact_code().map(ArtifactCode::kind)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{FAMILY}-{}-{}", self.scope, self.code)
    }
}
