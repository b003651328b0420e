//! Check result document schema
//!
//! Append-only pass facts. A `(checkId, principal)` pair, once stored, marks
//! the check as permanently satisfied for that principal.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for pass facts
pub const RESULTS_COLLECTION: &str = "results";

/// Pass fact stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckResultDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub check_id: String,

    pub principal: String,

    /// When the pass was recorded
    pub timestamp: DateTime,
}

impl CheckResultDoc {
    pub fn new(check_id: &str, principal: &str) -> Self {
        Self {
            id: None,
            check_id: check_id.to_string(),
            principal: principal.to_string(),
            timestamp: DateTime::now(),
        }
    }
}

impl IntoIndexes for CheckResultDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "principal": 1, "checkId": 1 },
            Some(
                IndexOptions::builder()
                    .name("principal_check_index".to_string())
                    .build(),
            ),
        )]
    }
}
