//! Database layer
//!
//! MongoDB client plus the document schemas for results, health and scenarios.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
