//! Scenario configuration schema
//!
//! Written by the provisioning tooling; read-only here. A non-empty
//! `exercises` list overrides the built-in check catalogue.

use bson::{oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for scenario documents
pub const SCENARIO_COLLECTION: &str = "scenario_config";

/// Field used to select one scenario document among several
pub const SCENARIO_KEY_FIELD: &str = "aws_route53_record_name";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ScenarioDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_route53_record_name: Option<String>,

    /// Ordered check ids
    #[serde(default)]
    pub exercises: Vec<String>,
}

impl IntoIndexes for ScenarioDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        Vec::new()
    }
}
