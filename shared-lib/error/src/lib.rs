//! Common error types for the clinical records services.
//!
//! Storage code returns these instead of driver errors so the API layer can
//! decide how each failure is reported.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while validating account input or handling passwords.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Expected at most one row: {0}")]
    MultipleRows(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error response.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<AccountError> for ErrorResponse {
    fn from(err: AccountError) -> Self {
        match &err {
            AccountError::MissingField(field) => {
                Self::new("ACCOUNT_MISSING_FIELD", "Required field is missing").with_details(field)
            }
            AccountError::InvalidEmail(_) => {
                Self::new("ACCOUNT_INVALID_EMAIL", "Email address is not valid")
            }
            // Hasher output is not meant for clients.
            AccountError::HashingFailed(_) => {
                Self::new("ACCOUNT_HASHING_FAILED", "Failed to process password")
            }
            AccountError::InvalidCredentials => {
                Self::new("ACCOUNT_INVALID_CREDENTIALS", "Invalid credentials")
            }
        }
    }
}

impl From<DatabaseError> for ErrorResponse {
    fn from(err: DatabaseError) -> Self {
        let (code, message) = match &err {
            DatabaseError::ConnectionFailed(_) => ("DB_CONNECTION_FAILED", "Database connection failed"),
            DatabaseError::QueryFailed(_) => ("DB_QUERY_FAILED", "Database query failed"),
            DatabaseError::DuplicateEntry(_) => ("DB_DUPLICATE_ENTRY", "Duplicate entry"),
            DatabaseError::ForeignKeyViolation(_) => ("DB_FOREIGN_KEY_VIOLATION", "Referenced record does not exist"),
            DatabaseError::MultipleRows(_) => ("DB_MULTIPLE_ROWS", "More than one record matched"),
            DatabaseError::TransactionFailed(_) => ("DB_TRANSACTION_FAILED", "Transaction failed"),
        };
        Self::new(code, message)
    }
}

impl From<AppError> for ErrorResponse {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Account(e) => e.into(),
            AppError::Database(e) => e.into(),
            AppError::Validation(msg) => Self::new("VALIDATION_FAILED", "Validation failed").with_details(msg),
            AppError::Internal(_) => Self::new("INTERNAL_ERROR", "Internal error"),
        }
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_entry_response() {
        let response: ErrorResponse = DatabaseError::DuplicateEntry("users.email".into()).into();
        assert_eq!(response.code, "DB_DUPLICATE_ENTRY");
        assert!(response.details.is_none());
    }

    #[test]
    fn test_hashing_failure_hides_cause() {
        let err = AppError::from(AccountError::HashingFailed("salt too short".into()));
        let response = ErrorResponse::from(err);
        assert_eq!(response.code, "ACCOUNT_HASHING_FAILED");
        assert!(!response.message.contains("salt"));
    }

    #[test]
    fn test_invalid_credentials_response() {
        let response = ErrorResponse::from(AppError::from(AccountError::InvalidCredentials));
        assert_eq!(response.code, "ACCOUNT_INVALID_CREDENTIALS");
        assert!(response.details.is_none());
    }

    #[test]
    fn test_details_skipped_when_absent() {
        let json = serde_json::to_value(ErrorResponse::new("X", "y")).unwrap();
        assert!(json.get("details").is_none());

        let json = serde_json::to_value(ErrorResponse::new("X", "y").with_details("z")).unwrap();
        assert_eq!(json["details"], "z");
    }
}
