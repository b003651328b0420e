//! Differential checks
//!
//! A check re-derives the correct answer with a direct query against the
//! principal's ground-truth database and compares it to what the target
//! service returns over HTTP. Every failure is a [`CheckFailure`]; nothing a
//! check does is allowed to abort the batch it runs in.

pub mod client;
pub mod compare;
pub mod crud;
pub mod indexes;
pub mod pipeline;
pub mod registry;
pub mod search;

pub use client::{LabClient, LabResponse};
pub use registry::{CheckDefinition, CheckFactory, CheckRegistry, DEFAULT_CHECKS};

use bson::Document;
use mongodb::{Collection, Database};

use crate::principal::Principal;

/// Collection holding the ground-truth listings
pub const LISTINGS_COLLECTION: &str = "listingsAndReviews";

/// Path of the listings resource under the target base URL
pub const LISTINGS_ENDPOINT: &str = "api/listingsAndReviews";

// ============================================================================
// Failure taxonomy
// ============================================================================

/// Why a check did not pass
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckFailure {
    /// Status code outside the success code expected for the request
    #[error("HTTP request failed with status {status} (expected {expected})")]
    Http { status: u16, expected: u16 },

    /// Response body missing or not the expected JSON shape
    #[error("Unexpected response shape: {0}")]
    Parse(String),

    /// Service answer disagrees with the ground truth
    #[error("Mismatch: {0}")]
    Mismatch(String),

    /// Index or configuration missing
    #[error("Configuration missing: {0}")]
    Config(String),

    /// Anything else
    #[error("{0}")]
    Unknown(String),
}

impl CheckFailure {
    /// Human-actionable string stored as `failureReason`
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::Mismatch(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<mongodb::error::Error> for CheckFailure {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Unknown(format!("Ground-truth query failed: {}", err))
    }
}

impl From<reqwest::Error> for CheckFailure {
    fn from(err: reqwest::Error) -> Self {
        Self::Unknown(format!("Request to target failed: {}", err))
    }
}

impl From<bson::de::Error> for CheckFailure {
    fn from(err: bson::de::Error) -> Self {
        Self::Unknown(format!("Ground-truth document unreadable: {}", err))
    }
}

// ============================================================================
// Check capability
// ============================================================================

/// One executable differential test
#[async_trait::async_trait]
pub trait Check: Send + Sync {
    async fn run(&self) -> Result<(), CheckFailure>;
}

/// Everything a check needs for one run
#[derive(Clone)]
pub struct CheckContext {
    pub principal: Principal,
    pub client: LabClient,
    pub ground_truth: Option<Database>,
}

impl CheckContext {
    pub fn new(principal: Principal, client: LabClient, ground_truth: Option<Database>) -> Self {
        Self {
            principal,
            client,
            ground_truth,
        }
    }

    /// Ground-truth listings collection
    pub fn listings(&self) -> Result<Collection<Document>, CheckFailure> {
        self.ground_truth
            .as_ref()
            .map(|db| db.collection::<Document>(LISTINGS_COLLECTION))
            .ok_or_else(|| CheckFailure::config("ground-truth database not configured"))
    }
}

/// Milliseconds since the epoch, used to make test fixture ids unique
pub(crate) fn unique_suffix() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reasons_are_descriptive() {
        let http = CheckFailure::Http {
            status: 404,
            expected: 200,
        };
        assert_eq!(
            http.reason(),
            "HTTP request failed with status 404 (expected 200)"
        );
        assert!(CheckFailure::mismatch("count 3 vs 5")
            .reason()
            .contains("count 3 vs 5"));
        assert!(!CheckFailure::Unknown("boom".into()).reason().is_empty());
    }

    #[test]
    fn test_missing_ground_truth_is_config_failure() {
        let ctx = CheckContext::new(
            Principal::new("alice"),
            LabClient::new(reqwest::Client::new(), "http://localhost/"),
            None,
        );
        assert!(matches!(ctx.listings(), Err(CheckFailure::Config(_))));
    }
}
