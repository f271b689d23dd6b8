//! Structured issues accumulated during evaluation.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// Issue codes, serialized with their OperationOutcome spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    CodeInvalid,
    NotSupported,
    NotFound,
    Informational,
    Processing,
}

impl IssueType {
    pub fn code(self) -> &'static str {
        match self {
            IssueType::Invalid => "invalid",
            IssueType::CodeInvalid => "code-invalid",
            IssueType::NotSupported => "not-supported",
            IssueType::NotFound => "not-found",
            IssueType::Informational => "informational",
            IssueType::Processing => "processing",
        }
    }
}

/// One soft finding: appended to the evaluation context instead of raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub code: IssueType,
    pub diagnostics: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl Issue {
    pub fn new(severity: IssueSeverity, code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            diagnostics: diagnostics.into(),
            expression: None,
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, IssueSeverity::Fatal | IssueSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_operation_outcome_codes() {
        let issue = Issue::new(
            IssueSeverity::Information,
            IssueType::CodeInvalid,
            "code 'x' is not in value set",
        )
        .with_expression("Patient.gender");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["severity"], "information");
        assert_eq!(json["code"], "code-invalid");
        assert_eq!(json["expression"], "Patient.gender");
        assert!(!issue.is_error());
    }
}
