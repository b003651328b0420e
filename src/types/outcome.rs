//! Per-run check outcomes

use serde::{Deserialize, Serialize};

/// Outcome of one check within a single run
///
/// Checks skipped because they already passed are reported as passed with
/// no reason.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseOutcome {
    pub check_id: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ExerciseOutcome {
    pub fn passed(check_id: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            passed: true,
            failure_reason: None,
        }
    }

    pub fn failed(check_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            passed: false,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Environment details recorded with every health record
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub environment: String,
    pub log_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_camel_case() {
        let json = serde_json::to_value(ExerciseOutcome::failed("crud-1", "boom")).unwrap();
        assert_eq!(json["checkId"], "crud-1");
        assert_eq!(json["passed"], false);
        assert_eq!(json["failureReason"], "boom");
    }

    #[test]
    fn test_passed_outcome_omits_reason() {
        let json = serde_json::to_value(ExerciseOutcome::passed("index")).unwrap();
        assert!(json.get("failureReason").is_none());
    }
}
