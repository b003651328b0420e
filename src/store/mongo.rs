//! MongoDB-backed result store

use std::collections::HashSet;

use bson::{doc, DateTime, Document};
use tracing::{debug, info, warn};

use super::{outcome_counts, ResultStore};
use crate::db::schemas::{
    CheckResultDoc, HealthDoc, RunStatus, ScenarioDoc, HEALTH_COLLECTION, RESULTS_COLLECTION,
    SCENARIO_COLLECTION, SCENARIO_KEY_FIELD,
};
use crate::db::{MongoClient, MongoCollection};
use crate::principal::Principal;
use crate::types::{EnvironmentInfo, ExerciseOutcome, Result};

/// Result store over the `results`, `results_health` and `scenario_config`
/// collections of the results database
pub struct MongoResultStore {
    results: MongoCollection<CheckResultDoc>,
    health: MongoCollection<HealthDoc>,
    scenarios: MongoCollection<ScenarioDoc>,
    scenario_key: Option<String>,
}

impl MongoResultStore {
    /// Open the collections and apply their indexes
    pub async fn new(client: &MongoClient, scenario_key: Option<String>) -> Result<Self> {
        let results = client.collection::<CheckResultDoc>(RESULTS_COLLECTION).await?;
        let health = client.collection::<HealthDoc>(HEALTH_COLLECTION).await?;
        let scenarios = client.collection::<ScenarioDoc>(SCENARIO_COLLECTION).await?;

        info!(db = %client.db_name(), "Result store ready");

        Ok(Self {
            results,
            health,
            scenarios,
            scenario_key,
        })
    }
}

#[async_trait::async_trait]
impl ResultStore for MongoResultStore {
    async fn completed_checks(&self, principal: &Principal) -> Result<HashSet<String>> {
        let ids = self
            .results
            .distinct_strings("checkId", doc! { "principal": principal.as_str() })
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn record_pass(&self, principal: &Principal, check_id: &str) -> Result<()> {
        let filter = doc! { "principal": principal.as_str(), "checkId": check_id };
        if self.results.exists(filter).await? {
            debug!(check_id = %check_id, "Pass already recorded");
            return Ok(());
        }

        self.results
            .insert_one(CheckResultDoc::new(check_id, principal.as_str()))
            .await
    }

    async fn begin_run(
        &self,
        principal: &Principal,
        environment: &EnvironmentInfo,
    ) -> Result<()> {
        self.health
            .upsert_replace(
                doc! { "principal": principal.as_str() },
                HealthDoc::started(principal.as_str(), environment.clone()),
            )
            .await
    }

    async fn finish_run(&self, principal: &Principal, outcomes: &[ExerciseOutcome]) -> Result<()> {
        let (total, passed) = outcome_counts(outcomes);
        let results = bson::to_bson(outcomes)?;
        let status = bson::to_bson(&RunStatus::Completed)?;

        let matched = self
            .health
            .update_one(
                doc! { "principal": principal.as_str() },
                doc! {
                    "$set": {
                        "exerciseResults": results,
                        "status": status,
                        "totalChecks": total,
                        "passedChecks": passed,
                        "lastUpdated": DateTime::now(),
                    }
                },
            )
            .await?;
        if !matched {
            warn!(principal = %principal, "No health record to complete");
        }
        Ok(())
    }

    async fn scenario_checks(&self) -> Result<Option<Vec<String>>> {
        let mut filter = Document::new();
        if let Some(key) = &self.scenario_key {
            filter.insert(SCENARIO_KEY_FIELD, key.as_str());
        }

        let scenario = self.scenarios.find_one(filter).await?;
        Ok(scenario
            .map(|s| s.exercises)
            .filter(|exercises| !exercises.is_empty()))
    }
}
