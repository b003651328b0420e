//! Execution scheduler
//!
//! Single-flight control over validation runs. A trigger that arrives while
//! a run is in flight is folded into one pending follow-up; however many
//! arrive, the in-flight run is followed by exactly one more. Both flags
//! live in one mutex-guarded state struct so "check running, set pending"
//! and "clear running, take pending" are atomic with respect to each other.

pub mod transcript;

pub use transcript::{RunTranscript, TRANSCRIPT_FILE};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::engine::{DifferentialTestEngine, RunReport};
use crate::signal::TriggerSink;
use crate::types::Result;

/// Why a run was requested
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCause {
    /// First run after process start
    Startup,
    /// Poll interval elapsed without a signal
    Scheduled,
    /// New signal seen through filesystem notification
    FileWatch,
    /// New signal seen by the polling fallback
    PollingSignal,
}

impl TriggerCause {
    /// True for causes backed by a new restart signal
    pub fn is_signal(&self) -> bool {
        matches!(self, TriggerCause::FileWatch | TriggerCause::PollingSignal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCause::Startup => "startup",
            TriggerCause::Scheduled => "scheduled",
            TriggerCause::FileWatch => "file_watch",
            TriggerCause::PollingSignal => "polling_signal",
        }
    }
}

impl fmt::Display for TriggerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// State machine
// ============================================================================

/// Result of offering a trigger to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Caller now owns the run loop
    Started,
    /// Folded into the pending follow-up of the in-flight run
    Coalesced,
}

/// Running flag plus the single pending follow-up
#[derive(Debug, Default)]
pub struct SchedulerState {
    running: bool,
    pending: Option<TriggerCause>,
}

impl SchedulerState {
    pub fn admit(&mut self, cause: TriggerCause) -> Admission {
        if !self.running {
            self.running = true;
            return Admission::Started;
        }

        // A signal outranks a scheduled tick so the follow-up still resets the transcript
        self.pending = match self.pending {
            Some(existing) if existing.is_signal() => Some(existing),
            _ => Some(cause),
        };
        Admission::Coalesced
    }

    /// Called when a run ends; returns the follow-up to run, or goes idle
    pub fn finish(&mut self) -> Option<TriggerCause> {
        match self.pending.take() {
            Some(next) => Some(next),
            None => {
                self.running = false;
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

// ============================================================================
// Executor seam
// ============================================================================

/// Performs one validation run
#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, cause: TriggerCause) -> Result<RunReport>;
}

#[async_trait]
impl RunExecutor for DifferentialTestEngine {
    async fn execute(&self, cause: TriggerCause) -> Result<RunReport> {
        debug!(cause = %cause, principal = %self.principal(), "Engine run requested");
        self.run().await
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct ExecutionScheduler {
    state: Mutex<SchedulerState>,
    executor: Arc<dyn RunExecutor>,
    transcript: Option<RunTranscript>,
    idle: Notify,
}

impl ExecutionScheduler {
    pub fn new(executor: Arc<dyn RunExecutor>) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            executor,
            transcript: None,
            idle: Notify::new(),
        }
    }

    pub fn with_transcript(mut self, transcript: RunTranscript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        // The guarded section never panics; recover the flags if it somehow did
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Request a run and, if admitted, drive it and any follow-ups
    ///
    /// Returns the number of runs this call performed; 0 when the trigger
    /// was coalesced into an in-flight run.
    pub async fn trigger(&self, cause: TriggerCause) -> usize {
        let admission = self.state().admit(cause);
        match admission {
            Admission::Started => self.drain(cause).await,
            Admission::Coalesced => {
                info!(cause = %cause, "Run in progress, queued follow-up");
                0
            }
        }
    }

    /// Run loop for an admitted trigger
    async fn drain(&self, first: TriggerCause) -> usize {
        let mut cause = first;
        let mut runs = 0;

        loop {
            self.execute_once(cause).await;
            runs += 1;

            let next = self.state().finish();
            match next {
                Some(next) => {
                    info!(cause = %next, "Running queued follow-up");
                    cause = next;
                }
                None => break,
            }
        }

        self.idle.notify_waiters();
        runs
    }

    async fn execute_once(&self, cause: TriggerCause) {
        if cause.is_signal() {
            if let Some(transcript) = &self.transcript {
                transcript.reset().await;
            }
        }

        info!(cause = %cause, "Validation run triggered");

        let guarded = std::panic::AssertUnwindSafe(self.executor.execute(cause)).catch_unwind();
        match guarded.await {
            Ok(Ok(report)) => {
                if let Some(transcript) = &self.transcript {
                    transcript.write(cause, &report).await;
                }
            }
            Ok(Err(e)) if e.is_transient() => {
                warn!(cause = %cause, error = %e, "Run failed, retrying on next trigger");
            }
            Ok(Err(e)) => {
                error!(cause = %cause, error = %e, "Run failed");
            }
            Err(_) => {
                error!(cause = %cause, "Run panicked");
            }
        }
    }

    /// Resolves once no run is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

/// Watcher-facing handle that runs admitted triggers on a spawned task
#[derive(Clone)]
pub struct SchedulerSink {
    scheduler: Arc<ExecutionScheduler>,
}

impl SchedulerSink {
    pub fn new(scheduler: Arc<ExecutionScheduler>) -> Self {
        Self { scheduler }
    }
}

impl TriggerSink for SchedulerSink {
    fn fire(&self, cause: TriggerCause) {
        let admission = self.scheduler.state().admit(cause);
        if admission == Admission::Coalesced {
            info!(cause = %cause, "Run in progress, queued follow-up");
            return;
        }

        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            scheduler.drain(cause).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_admits() {
        let mut state = SchedulerState::default();
        assert_eq!(state.admit(TriggerCause::Startup), Admission::Started);
        assert!(state.is_running());
        assert!(!state.has_pending());
    }

    #[test]
    fn test_triggers_while_running_collapse() {
        let mut state = SchedulerState::default();
        state.admit(TriggerCause::Startup);
        for _ in 0..5 {
            assert_eq!(state.admit(TriggerCause::Scheduled), Admission::Coalesced);
        }

        assert_eq!(state.finish(), Some(TriggerCause::Scheduled));
        assert!(state.is_running());
        assert_eq!(state.finish(), None);
        assert!(!state.is_running());
    }

    #[test]
    fn test_signal_wins_pending_slot() {
        let mut state = SchedulerState::default();
        state.admit(TriggerCause::Startup);
        state.admit(TriggerCause::FileWatch);
        state.admit(TriggerCause::Scheduled);

        assert_eq!(state.finish(), Some(TriggerCause::FileWatch));
    }

    #[test]
    fn test_cause_display_and_kind() {
        assert_eq!(TriggerCause::PollingSignal.to_string(), "polling_signal");
        assert!(TriggerCause::FileWatch.is_signal());
        assert!(!TriggerCause::Scheduled.is_signal());
        assert!(!TriggerCause::Startup.is_signal());
    }
}
