//! # Store Error Types
//!
//! Error types for store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Business rule (CoreError)          │
//! │       │                                     │                           │
//! │       ▼                                     ▼                           │
//! │  DbError (this module) ← categorization, CoreError carried as-is       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  kind() → ErrorKind  ← the only thing a front-end branches on          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bodega_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

/// SQLite primary and extended result codes that mean "another writer won".
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_SNAPSHOT: &str = "517";

/// Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Business rule violation raised inside a repository.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Entity not found in the store.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate article code
    /// - Duplicate sale number (doc_type, series, number)
    /// - Username or email already taken (case-insensitive)
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing a non-existent category, supplier or article
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A concurrent writer holds the lock or advanced the article ledger
    /// first. The transaction was rolled back; the caller may retry.
    #[error("Concurrent update conflict, retry: {0}")]
    ConflictRetry(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal store error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Maps the error onto the closed taxonomy.
    ///
    /// ```text
    /// Core(e)              → e.kind()
    /// NotFound             → NOT_FOUND
    /// UniqueViolation      → CONFLICT
    /// ForeignKeyViolation  → NOT_FOUND   (a referenced row is absent)
    /// ConflictRetry        → CONFLICT_RETRY
    /// everything else      → INTERNAL
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Core(e) => e.kind(),
            DbError::NotFound { .. } => ErrorKind::NotFound,
            DbError::UniqueViolation { .. } => ErrorKind::Conflict,
            DbError::ForeignKeyViolation { .. } => ErrorKind::NotFound,
            DbError::ConflictRetry(_) => ErrorKind::ConflictRetry,
            DbError::ConnectionFailed(_)
            | DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::PoolExhausted
            | DbError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Rewrites a generic unique violation with the business key that
    /// caused it.
    pub(crate) fn with_duplicate_key(self, entity: &str, key: impl Into<String>) -> Self {
        match self {
            DbError::UniqueViolation { .. } => DbError::Core(CoreError::Duplicate {
                entity: entity.to_string(),
                key: key.into(),
            }),
            other => other,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Core(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound        → DbError::NotFound
/// SQLITE_BUSY / BUSY_SNAPSHOT     → DbError::ConflictRetry
/// UNIQUE kardex(article_id, seq)  → DbError::ConflictRetry
/// other UNIQUE                    → DbError::UniqueViolation
/// FOREIGN KEY                     → DbError::ForeignKeyViolation
/// sqlx::Error::PoolTimedOut       → DbError::PoolExhausted
/// Other                           → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();
                let code = code.as_deref().unwrap_or("");

                if code == SQLITE_BUSY
                    || code == SQLITE_LOCKED
                    || code == SQLITE_BUSY_SNAPSHOT
                    || msg.contains("database is locked")
                {
                    DbError::ConflictRetry(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();

                    if field.starts_with("kardex.") {
                        DbError::ConflictRetry(msg.to_string())
                    } else {
                        DbError::UniqueViolation {
                            field,
                            value: "unknown".to_string(),
                        }
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("serialization: {}", err))
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;
