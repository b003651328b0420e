//! Run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ExerciseOutcome;

/// Why a run finished the way it did
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunDisposition {
    /// Every pending check was executed
    Completed,
    /// No target configured; nothing executed
    TargetNotConfigured,
    /// Probe failed; nothing executed
    TargetUnavailable,
    /// Shutdown stopped the batch early
    Interrupted,
}

/// Summary of one engine run
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub principal: String,
    pub target: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub disposition: RunDisposition,
    /// One entry per active check, in catalogue order
    pub outcomes: Vec<ExerciseOutcome>,
    /// Checks actually invoked this run
    pub executed: Vec<String>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    pub fn outcome(&self, check_id: &str) -> Option<&ExerciseOutcome> {
        self.outcomes.iter().find(|o| o.check_id == check_id)
    }
}
