//! Error types for the notifications domain.
//!
//! Errors carry a retry category that drives outbox behavior:
//! - **Transient**: retried with exponential backoff up to the job's budget
//! - **Permanent**: recorded and dead-lettered without further retries

use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Category of error for determining retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure, retry with exponential backoff.
    Transient,
    /// Unrecoverable error, dead-letter immediately.
    Permanent,
}

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Recipient has no email address on file.
    #[error("No email address on file for user {0}")]
    NoEmailOnFile(String),

    /// Email provider transport error (network, 5xx).
    #[error("Email provider error: {0}")]
    Provider(String),

    /// Email provider rejected the message (4xx, invalid payload).
    #[error("Email provider rejected the message: {0}")]
    ProviderRejected(String),

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    Template(String),

    /// Storage error.
    #[error("Store error: {0}")]
    Store(String),

    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not the record's recipient or org member.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NotificationError {
    /// Get the retry category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            NotificationError::NoEmailOnFile(_) => ErrorCategory::Permanent,
            NotificationError::Provider(_) => ErrorCategory::Transient,
            NotificationError::ProviderRejected(_) => ErrorCategory::Permanent,
            NotificationError::Template(_) => ErrorCategory::Permanent,
            NotificationError::Store(_) => ErrorCategory::Transient,
            NotificationError::NotFound(_) => ErrorCategory::Permanent,
            NotificationError::Forbidden(_) => ErrorCategory::Permanent,
            NotificationError::Config(_) => ErrorCategory::Permanent,
            NotificationError::Internal(_) => ErrorCategory::Permanent,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::Store(err.to_string())
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::Template(err.to_string())
    }
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::Provider(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Internal(format!("JSON serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_categories() {
        assert!(NotificationError::Provider("timeout".into()).is_transient());
        assert!(NotificationError::Store("connection reset".into()).is_transient());
    }

    #[test]
    fn test_permanent_categories() {
        assert!(!NotificationError::NoEmailOnFile("u1".into()).is_transient());
        assert!(!NotificationError::ProviderRejected("bad address".into()).is_transient());
        assert!(!NotificationError::Template("missing template".into()).is_transient());
    }
}
