//! Mapping from driver errors to [`DatabaseError`].

use error::DatabaseError;

/// Classify a sqlx error.
///
/// Constraint violations are kept distinct so callers can report duplicates
/// and dangling references separately from connectivity problems.
pub fn classify(err: sqlx::Error) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DatabaseError::DuplicateEntry(db_err.message().to_string())
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            DatabaseError::ForeignKeyViolation(db_err.message().to_string())
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => DatabaseError::ConnectionFailed(err.to_string()),
        _ => DatabaseError::QueryFailed(err.to_string()),
    }
}
