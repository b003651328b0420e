//! In-memory result store

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{outcome_counts, ResultStore};
use crate::db::schemas::{HealthDoc, RunStatus};
use crate::principal::Principal;
use crate::types::{EnvironmentInfo, ExerciseOutcome, Result};

#[derive(Default)]
struct Inner {
    passes: HashMap<String, HashSet<String>>,
    pass_log: Vec<(String, String)>,
    health: HashMap<String, HealthDoc>,
    scenario: Option<Vec<String>>,
}

/// Result store held in process memory
///
/// Same contract as the MongoDB store. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryResultStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a dynamic check list as a scenario document would
    pub async fn set_scenario(&self, exercises: Vec<String>) {
        self.inner.write().await.scenario = Some(exercises);
    }

    /// Pre-record a pass without going through a run
    pub async fn seed_pass(&self, principal: &Principal, check_id: &str) {
        self.inner
            .write()
            .await
            .passes
            .entry(principal.as_str().to_string())
            .or_default()
            .insert(check_id.to_string());
    }

    /// Every `(principal, checkId)` appended by [`ResultStore::record_pass`], in order
    pub async fn pass_log(&self) -> Vec<(String, String)> {
        self.inner.read().await.pass_log.clone()
    }

    /// Current health record for a principal
    pub async fn health(&self, principal: &Principal) -> Option<HealthDoc> {
        self.inner.read().await.health.get(principal.as_str()).cloned()
    }
}

#[async_trait::async_trait]
impl ResultStore for MemoryResultStore {
    async fn completed_checks(&self, principal: &Principal) -> Result<HashSet<String>> {
        Ok(self
            .inner
            .read()
            .await
            .passes
            .get(principal.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn record_pass(&self, principal: &Principal, check_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let inserted = inner
            .passes
            .entry(principal.as_str().to_string())
            .or_default()
            .insert(check_id.to_string());
        if inserted {
            inner
                .pass_log
                .push((principal.as_str().to_string(), check_id.to_string()));
        }
        Ok(())
    }

    async fn begin_run(
        &self,
        principal: &Principal,
        environment: &EnvironmentInfo,
    ) -> Result<()> {
        self.inner.write().await.health.insert(
            principal.as_str().to_string(),
            HealthDoc::started(principal.as_str(), environment.clone()),
        );
        Ok(())
    }

    async fn finish_run(&self, principal: &Principal, outcomes: &[ExerciseOutcome]) -> Result<()> {
        let (total, passed) = outcome_counts(outcomes);
        let mut inner = self.inner.write().await;

        // Mirrors an update_one without upsert: no started record, nothing to update
        if let Some(health) = inner.health.get_mut(principal.as_str()) {
            health.exercise_results = outcomes.to_vec();
            health.status = RunStatus::Completed;
            health.total_checks = Some(total);
            health.passed_checks = Some(passed);
            health.last_updated = Some(bson::DateTime::now());
        }
        Ok(())
    }

    async fn scenario_checks(&self) -> Result<Option<Vec<String>>> {
        Ok(self
            .inner
            .read()
            .await
            .scenario
            .clone()
            .filter(|exercises| !exercises.is_empty()))
    }
}
