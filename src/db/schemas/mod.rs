//! Database schemas
//!
//! MongoDB document structures for pass facts, health records and scenarios.

mod check_result;
mod health;
mod scenario;

pub use check_result::{CheckResultDoc, RESULTS_COLLECTION};
pub use health::{HealthDoc, RunStatus, HEALTH_COLLECTION};
pub use scenario::{ScenarioDoc, SCENARIO_COLLECTION, SCENARIO_KEY_FIELD};
