//! Lab validator - differential validation harness for participant services
//!
//! Re-derives expected answers from the ground-truth database, compares
//! them with what the participant's HTTP service returns, and records
//! durable pass facts plus a per-run health record.
//!
//! ## Components
//!
//! - **Store**: pass facts, health record and scenario override in MongoDB
//! - **Probe**: reachability check before any work is spent on checks
//! - **Checks**: ordered catalogue of differential checks
//! - **Engine**: idempotent run over the active check list
//! - **Signal**: restart-signal watcher (inotify, polling fallback)
//! - **Scheduler**: single-flight runs with one coalesced follow-up

pub mod checks;
pub mod config;
pub mod db;
pub mod engine;
pub mod principal;
pub mod probe;
pub mod scheduler;
pub mod shutdown;
pub mod signal;
pub mod store;
pub mod types;

pub use config::Args;
pub use engine::{DifferentialTestEngine, RunReport};
pub use principal::Principal;
pub use scheduler::{ExecutionScheduler, TriggerCause};
pub use types::{Result, ValidatorError};
