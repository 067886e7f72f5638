//! # Error Types
//!
//! Domain-specific error types for bodega-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bodega-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Field contract failures                        │
//! │  └── ErrorKind        - Closed taxonomy every error maps onto          │
//! │                                                                         │
//! │  bodega-db errors (separate crate)                                     │
//! │  └── DbError          - Store failures, wraps CoreError                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller (via kind())     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// The closed set of outcomes a caller can branch on.
///
/// Every error in the workspace reports one of these through `kind()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Input fails a field contract. Never retried.
    InvalidArgument,
    /// Referenced entity absent.
    NotFound,
    /// Unique-key violation.
    Conflict,
    /// An OUT movement would drive stock below zero.
    StockWouldGoNegative,
    /// Non-base payment currency without a recorded rate.
    RateUnavailable,
    /// Current actor lacks the required permission token.
    PermissionDenied,
    /// Credentials did not match.
    AuthFailed,
    /// Operation not allowed in the document's current state.
    StateForbidden,
    /// Concurrent writer conflict; the caller may retry.
    ConflictRetry,
    /// Unexpected store failure.
    Internal,
}

impl ErrorKind {
    /// Stable upper-case code, e.g. `STOCK_WOULD_GO_NEGATIVE`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::StockWouldGoNegative => "STOCK_WOULD_GO_NEGATIVE",
            ErrorKind::RateUnavailable => "RATE_UNAVAILABLE",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::AuthFailed => "AUTH_FAILED",
            ErrorKind::StateForbidden => "STATE_FORBIDDEN",
            ErrorKind::ConflictRetry => "CONFLICT_RETRY",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique key already taken (code, username, document number...).
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: String, key: String },

    /// Not enough stock to post an OUT movement.
    ///
    /// ## When This Occurs
    /// ```text
    /// record_sale(qty: 7)
    ///      │
    ///      ▼
    /// current_stock(A) = 3
    ///      │
    ///      ▼
    /// StockWouldGoNegative { article_id: A, available: 3, requested: 7 }
    /// ```
    #[error("Insufficient stock for article {article_id}: available {available}, requested {requested}")]
    StockWouldGoNegative {
        article_id: i64,
        available: i64,
        requested: i64,
    },

    /// No exchange rate recorded for a non-base currency.
    #[error("No exchange rate recorded for {currency}")]
    RateUnavailable { currency: String },

    /// The session lacks a permission token.
    #[error("Permission denied: {permission} required")]
    PermissionDenied { permission: String },

    /// Credentials did not match. The message is deliberately generic.
    #[error("Invalid username or password")]
    AuthFailed,

    /// The document (or token) is not in a state that allows the operation.
    ///
    /// ## When This Occurs
    /// - Voiding an already voided sale
    /// - Voiding a sale from a previous day
    /// - Deleting a role still assigned to an active worker
    /// - Accepting an expired reset token
    #[error("{entity} {id}: {reason}")]
    StateForbidden {
        entity: String,
        id: String,
        reason: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a StateForbidden error.
    pub fn forbidden(
        entity: impl Into<String>,
        id: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::StateForbidden {
            entity: entity.into(),
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Maps the error onto the closed taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Duplicate { .. } => ErrorKind::Conflict,
            CoreError::StockWouldGoNegative { .. } => ErrorKind::StockWouldGoNegative,
            CoreError::RateUnavailable { .. } => ErrorKind::RateUnavailable,
            CoreError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            CoreError::AuthFailed => ErrorKind::AuthFailed,
            CoreError::StateForbidden { .. } => ErrorKind::StateForbidden,
            CoreError::Validation(_) => ErrorKind::InvalidArgument,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet a field contract.
/// All of them surface as `INVALID_ARGUMENT`.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., cedula, RIF, email, date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// A collection that needs at least one element is empty.
    #[error("{field} must not be empty")]
    Empty { field: String },

    /// Arithmetic on the value left the `i64` range.
    #[error("{field} is too large")]
    Overflow { field: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn overflow(field: &str) -> Self {
        ValidationError::Overflow {
            field: field.to_string(),
        }
    }

    pub fn invalid_format(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
