//! Build-time issue collection.
//!
//! The compiler gathers every structural problem it finds in one pass and reports
//! them together instead of stopping at the first.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub location: String,
    pub kind: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        location: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ValidationIssue {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// Turn a non-empty issue list into a single error carrying every issue.
pub fn fail_if_issues(issues: Vec<ValidationIssue>) -> anyhow::Result<()> {
    if issues.is_empty() {
        return Ok(());
    }
    for issue in &issues {
        tracing::error!(
            location = %issue.location,
            kind = %issue.kind,
            message = %issue.message,
            "Build defect"
        );
    }
    let lines: Vec<String> = issues.iter().map(ToString::to_string).collect();
    anyhow::bail!("{} issue(s) found:\n{}", issues.len(), lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_if_issues_empty_is_ok() {
        assert!(fail_if_issues(Vec::new()).is_ok());
    }

    #[test]
    fn test_fail_if_issues_reports_all() {
        let err = fail_if_issues(vec![
            ValidationIssue::new("loc1", "DanglingEdge", "message1"),
            ValidationIssue::new("loc2", "DanglingEdge", "message2"),
        ])
        .unwrap_err()
        .to_string();
        assert!(err.contains("2 issue(s) found"));
        assert!(err.contains("[DanglingEdge] loc1: message1"));
        assert!(err.contains("[DanglingEdge] loc2: message2"));
    }
}
