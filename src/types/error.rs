//! Error types for the validator
//!
//! Infrastructure errors only. Logical check failures are carried by
//! [`crate::checks::CheckFailure`] and never surface through this type.

/// Main error type for validator operations
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Signal watcher error: {0}")]
    Signal(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ValidatorError {
    /// Whether the next scheduled or signaled cycle may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Http(_) | Self::Io(_))
    }
}

impl From<std::io::Error> for ValidatorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ValidatorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for ValidatorError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for ValidatorError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON serialization failed: {}", err))
    }
}

impl From<bson::de::Error> for ValidatorError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON deserialization failed: {}", err))
    }
}

impl From<reqwest::Error> for ValidatorError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Result type alias for validator operations
pub type Result<T> = std::result::Result<T, ValidatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ValidatorError::Database("down".into()).is_transient());
        assert!(ValidatorError::Http("refused".into()).is_transient());
        assert!(!ValidatorError::Config("missing".into()).is_transient());
    }

    #[test]
    fn test_io_conversion_keeps_message() {
        let err: ValidatorError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert_eq!(err.to_string(), "I/O error: no such file");
    }
}
