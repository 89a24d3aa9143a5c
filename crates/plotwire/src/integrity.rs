//! Whole-graph consistency checks.
//!
//! Checks are registered per model type and run against every instance
//! reachable from the given roots. Findings are collected, never raised.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::document::Document;
use crate::graph::collect_models;
use plotwire_props::ModelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IssueCode {
    pub code: u16,
    pub name: &'static str,
    pub description: &'static str,
    pub severity: Severity,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => 'E',
            Severity::Warning => 'W',
        };
        write!(f, "{prefix}-{}", self.code)
    }
}

pub mod codes {
    use super::{IssueCode, Severity};

    pub const MISSING_RENDERERS: IssueCode = IssueCode {
        code: 1000,
        name: "MISSING_RENDERERS",
        description: "Plot has no renderers",
        severity: Severity::Warning,
    };

    pub const BAD_COLUMN_NAME: IssueCode = IssueCode {
        code: 1001,
        name: "BAD_COLUMN_NAME",
        description: "Glyph refers to nonexistent column name. This could either be due to a misspelling or typo, or due to an expected column being missing. ",
        severity: Severity::Error,
    };

    pub const MISSING_GLYPH: IssueCode = IssueCode {
        code: 1002,
        name: "MISSING_GLYPH",
        description: "Glyph renderer has no glyph set",
        severity: Severity::Error,
    };

    pub const BAD_EXTRA_RANGE_NAME: IssueCode = IssueCode {
        code: 1020,
        name: "BAD_EXTRA_RANGE_NAME",
        description: "An extra range name is configured with a name that does not correspond to any range",
        severity: Severity::Error,
    };

    pub const MIN_PREFERRED_MAX_WIDTH: IssueCode = IssueCode {
        code: 1022,
        name: "MIN_PREFERRED_MAX_WIDTH",
        description: "Expected min_width <= width <= max_width",
        severity: Severity::Error,
    };

    pub const MIN_PREFERRED_MAX_HEIGHT: IssueCode = IssueCode {
        code: 1023,
        name: "MIN_PREFERRED_MAX_HEIGHT",
        description: "Expected min_height <= height <= max_height",
        severity: Severity::Error,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: u16,
    pub name: String,
    pub text: String,
    pub extra: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssues {
    pub error: Vec<ValidationIssue>,
    pub warning: Vec<ValidationIssue>,
}

impl ValidationIssues {
    pub fn is_empty(&self) -> bool {
        self.error.is_empty() && self.warning.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Warning codes to skip. Errors cannot be silenced.
    pub silenced: Vec<u16>,
}

impl CheckOptions {
    pub fn silence(mut self, code: IssueCode) -> Self {
        if code.severity == Severity::Warning && !self.silenced.contains(&code.code) {
            self.silenced.push(code.code);
        }
        self
    }
}

pub fn check_integrity(doc: &Document, roots: &[ModelId]) -> ValidationIssues {
    check_integrity_with(doc, roots, &CheckOptions::default())
}

pub fn check_integrity_with(doc: &Document, roots: &[ModelId], options: &CheckOptions) -> ValidationIssues {
    let mut issues = ValidationIssues::default();
    for id in collect_models(doc, roots).ids() {
        let Some(instance) = doc.model(*id) else {
            continue;
        };
        for check in instance.def().checks() {
            let code = check.code;
            if code.severity == Severity::Warning && options.silenced.contains(&code.code) {
                continue;
            }
            let Some(extra) = (check.run)(doc, *id) else {
                continue;
            };
            let issue = ValidationIssue {
                code: code.code,
                name: code.name.to_owned(),
                text: code.description.to_owned(),
                extra,
            };
            match code.severity {
                Severity::Error => issues.error.push(issue),
                Severity::Warning => issues.warning.push(issue),
            }
        }
    }
    issues
}

/// Logs every issue, errors first.
pub fn process_validation_issues(issues: &ValidationIssues) {
    for issue in &issues.error {
        error!("E-{} ({}): {}: {}", issue.code, issue.name, issue.text, issue.extra);
    }
    for issue in &issues.warning {
        warn!("W-{} ({}): {}: {}", issue.code, issue.name, issue.text, issue.extra);
    }
}
