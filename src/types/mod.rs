//! Shared types

pub mod error;
pub mod outcome;

pub use error::{Result, ValidatorError};
pub use outcome::{EnvironmentInfo, ExerciseOutcome};
