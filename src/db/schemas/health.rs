//! Health document schema
//!
//! One document per principal describing the most recent run. Replaced at
//! run start, updated once at run end.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::types::{EnvironmentInfo, ExerciseOutcome};

/// Collection name for health records
pub const HEALTH_COLLECTION: &str = "results_health";

/// Run status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run has begun, results not yet known
    #[default]
    Started,
    /// Run finished and results were written
    Completed,
}

/// Health record stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct HealthDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub principal: String,

    #[serde(default)]
    pub environment_info: EnvironmentInfo,

    #[serde(default)]
    pub exercise_results: Vec<ExerciseOutcome>,

    #[serde(default)]
    pub status: RunStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_checks: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_checks: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime>,
}

impl HealthDoc {
    /// Fresh record written at the start of a run
    pub fn started(principal: &str, environment_info: EnvironmentInfo) -> Self {
        Self {
            id: None,
            principal: principal.to_string(),
            environment_info,
            exercise_results: Vec::new(),
            status: RunStatus::Started,
            total_checks: None,
            passed_checks: None,
            last_updated: Some(DateTime::now()),
        }
    }
}

impl IntoIndexes for HealthDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "principal": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("principal_unique".to_string())
                    .build(),
            ),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_record_shape() {
        let doc = bson::to_document(&HealthDoc::started("alice", EnvironmentInfo::default()))
            .unwrap();
        assert_eq!(doc.get_str("principal").unwrap(), "alice");
        assert_eq!(doc.get_str("status").unwrap(), "started");
        assert!(doc.get_array("exerciseResults").unwrap().is_empty());
        assert!(!doc.contains_key("totalChecks"));
        assert!(!doc.contains_key("_id"));
    }
}
