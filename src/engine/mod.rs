//! Differential test engine
//!
//! Runs the active check list for the principal against the target,
//! skipping checks that already passed, and produces one outcome per active
//! check even when checks fail, panic or time out.
//!
//! ## Run sequence
//!
//! 1. Replace the health record with a `started` one
//! 2. Resolve the active list (scenario document, else built-in catalogue)
//! 3. No target: every check fails with "target not configured"
//! 4. Probe fails: every check fails with "target unavailable"
//! 5. Already-passed checks are reported passed without running; the rest run
//!    sequentially, each bounded by a timeout, with a pass fact written as
//!    soon as a check succeeds
//! 6. The ordered outcomes and counts are written to the health record

pub mod report;

pub use report::{RunDisposition, RunReport};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use mongodb::Database;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checks::{CheckContext, CheckFailure, CheckRegistry, LabClient};
use crate::principal::Principal;
use crate::probe::ServiceProbe;
use crate::shutdown::Shutdown;
use crate::store::ResultStore;
use crate::types::{EnvironmentInfo, ExerciseOutcome, Result};

pub const REASON_TARGET_NOT_CONFIGURED: &str = "target not configured";
pub const REASON_TARGET_UNAVAILABLE: &str = "target unavailable";
pub const REASON_INTERRUPTED: &str = "run interrupted before the check executed";

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Pause between consecutive executed checks
    pub inter_check_delay: Duration,
    /// Upper bound for a single check
    pub check_timeout: Duration,
    /// Recorded in the health record
    pub environment: EnvironmentInfo,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            inter_check_delay: Duration::from_millis(500),
            check_timeout: Duration::from_secs(30),
            environment: EnvironmentInfo::default(),
        }
    }
}

/// Runs differential checks for one principal
pub struct DifferentialTestEngine {
    principal: Principal,
    store: Arc<dyn ResultStore>,
    probe: Arc<dyn ServiceProbe>,
    registry: CheckRegistry,
    http: reqwest::Client,
    target: Option<String>,
    ground_truth: Option<Database>,
    settings: EngineSettings,
    shutdown: Shutdown,
}

impl DifferentialTestEngine {
    pub fn new(
        principal: Principal,
        store: Arc<dyn ResultStore>,
        probe: Arc<dyn ServiceProbe>,
        registry: CheckRegistry,
        http: reqwest::Client,
    ) -> Self {
        Self {
            principal,
            store,
            probe,
            registry,
            http,
            target: None,
            ground_truth: None,
            settings: EngineSettings::default(),
            shutdown: Shutdown::never(),
        }
    }

    /// Base URL of the service under test, ending in `/`
    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    /// Database the checks query for ground truth
    pub fn with_ground_truth(mut self, db: Database) -> Self {
        self.ground_truth = Some(db);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Execute one run
    ///
    /// Errors are infrastructure failures of the store; individual check
    /// failures never surface here.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = chrono::Utc::now();
        let mut shutdown = self.shutdown.clone();

        self.store
            .begin_run(&self.principal, &self.settings.environment)
            .await?;

        let dynamic = match self.store.scenario_checks().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Failed to load scenario, using built-in checks");
                None
            }
        };
        let active = self.registry.active_list(dynamic);

        info!(
            run_id = %run_id,
            principal = %self.principal,
            checks = active.len(),
            "Starting validation run"
        );

        let mut executed = Vec::new();
        let (outcomes, disposition) = match self.target.as_deref() {
            None => {
                warn!(principal = %self.principal, "No target service configured");
                (
                    fail_all(&active, REASON_TARGET_NOT_CONFIGURED),
                    RunDisposition::TargetNotConfigured,
                )
            }
            Some(target) => {
                if self.probe.is_available(target).await {
                    // Without the stored passes every check simply runs again
                    let completed = match self.store.completed_checks(&self.principal).await {
                        Ok(completed) => completed,
                        Err(e) => {
                            warn!(error = %e, "Failed to load passed checks, re-running all");
                            HashSet::new()
                        }
                    };
                    self.execute_checks(target, &active, &completed, &mut executed, &mut shutdown)
                        .await
                } else {
                    (
                        fail_all(&active, REASON_TARGET_UNAVAILABLE),
                        RunDisposition::TargetUnavailable,
                    )
                }
            }
        };

        self.store.finish_run(&self.principal, &outcomes).await?;

        let report = RunReport {
            run_id,
            principal: self.principal.to_string(),
            target: self.target.clone(),
            started_at,
            finished_at: chrono::Utc::now(),
            disposition,
            outcomes,
            executed,
        };

        info!(
            run_id = %run_id,
            passed = report.passed(),
            total = report.total(),
            executed = report.executed.len(),
            disposition = ?report.disposition,
            "Validation run finished"
        );

        Ok(report)
    }

    async fn execute_checks(
        &self,
        target: &str,
        active: &[String],
        completed: &HashSet<String>,
        executed: &mut Vec<String>,
        shutdown: &mut Shutdown,
    ) -> (Vec<ExerciseOutcome>, RunDisposition) {
        let ctx = CheckContext::new(
            self.principal.clone(),
            LabClient::new(self.http.clone(), target),
            self.ground_truth.clone(),
        );

        let mut outcomes = Vec::with_capacity(active.len());
        let mut interrupted = false;

        for id in active {
            if completed.contains(id) {
                debug!(check_id = %id, "Already passed, skipping");
                outcomes.push(ExerciseOutcome::passed(id));
                continue;
            }

            if interrupted {
                outcomes.push(ExerciseOutcome::failed(id, REASON_INTERRUPTED));
                continue;
            }

            // Pace the target service between executed checks
            let paced = executed.is_empty() || shutdown.sleep(self.settings.inter_check_delay).await;
            if !paced || shutdown.is_triggered() {
                info!("Shutdown requested, stopping batch");
                interrupted = true;
                outcomes.push(ExerciseOutcome::failed(id, REASON_INTERRUPTED));
                continue;
            }

            executed.push(id.clone());
            match self.run_check(id, &ctx).await {
                Ok(()) => {
                    // An unrecorded pass is only re-executed next run
                    if let Err(e) = self.store.record_pass(&self.principal, id).await {
                        warn!(check_id = %id, error = %e, "Failed to record pass");
                    }
                    info!(check_id = %id, "Check passed");
                    outcomes.push(ExerciseOutcome::passed(id));
                }
                Err(failure) => {
                    warn!(check_id = %id, reason = %failure, "Check failed");
                    outcomes.push(ExerciseOutcome::failed(id, failure.reason()));
                }
            }
        }

        let disposition = if interrupted {
            RunDisposition::Interrupted
        } else {
            RunDisposition::Completed
        };
        (outcomes, disposition)
    }

    /// Build and run one check, turning timeouts and panics into failures
    async fn run_check(&self, id: &str, ctx: &CheckContext) -> std::result::Result<(), CheckFailure> {
        let check = self
            .registry
            .build(id, ctx)
            .ok_or_else(|| CheckFailure::config(format!("unknown check '{}'", id)))?;

        let guarded = std::panic::AssertUnwindSafe(check.run()).catch_unwind();
        match tokio::time::timeout(self.settings.check_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(CheckFailure::Unknown(panic_message(panic.as_ref()))),
            Err(_) => Err(CheckFailure::Unknown(format!(
                "check timed out after {}s",
                self.settings.check_timeout.as_secs_f64()
            ))),
        }
    }
}

fn fail_all(active: &[String], reason: &str) -> Vec<ExerciseOutcome> {
    active
        .iter()
        .map(|id| ExerciseOutcome::failed(id, reason))
        .collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("check panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("check panicked: {}", s)
    } else {
        "check panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_all_covers_every_check() {
        let active = vec!["a".to_string(), "b".to_string()];
        let outcomes = fail_all(&active, REASON_TARGET_UNAVAILABLE);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.passed));
        assert_eq!(outcomes[1].failure_reason.as_deref(), Some("target unavailable"));
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("bad index");
        assert_eq!(panic_message(boxed.as_ref()), "check panicked: bad index");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "check panicked: owned");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "check panicked");
    }
}
