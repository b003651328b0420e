//! Result persistence
//!
//! [`ResultStore`] tracks which checks a principal has already passed,
//! appends new pass facts and maintains the per-principal health record.
//! The MongoDB implementation backs the daemon; the in-memory one backs
//! tests and dry runs.

pub mod memory;
pub mod mongo;

pub use memory::MemoryResultStore;
pub use mongo::MongoResultStore;

use std::collections::HashSet;

use crate::principal::Principal;
use crate::types::{EnvironmentInfo, ExerciseOutcome, Result};

/// Persistence contract consumed by the engine
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    /// Check ids already passed by the principal
    async fn completed_checks(&self, principal: &Principal) -> Result<HashSet<String>>;

    /// Append a pass fact; a pair that already exists is left as is
    async fn record_pass(&self, principal: &Principal, check_id: &str) -> Result<()>;

    /// Replace-or-insert the health record with a `started` one
    async fn begin_run(&self, principal: &Principal, environment: &EnvironmentInfo)
        -> Result<()>;

    /// Write the ordered outcomes, aggregate counts and `completed` status
    async fn finish_run(&self, principal: &Principal, outcomes: &[ExerciseOutcome]) -> Result<()>;

    /// Dynamic check list, if a scenario document supplies one
    async fn scenario_checks(&self) -> Result<Option<Vec<String>>>;
}

/// Aggregate counts for a finished run
pub fn outcome_counts(outcomes: &[ExerciseOutcome]) -> (i64, i64) {
    let total = outcomes.len() as i64;
    let passed = outcomes.iter().filter(|o| o.passed).count() as i64;
    (total, passed)
}
