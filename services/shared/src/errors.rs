/// Shared error types for the wager settlement services
///
/// Design Philosophy:
/// - Standardized error codes for consistent error handling across services
/// - Categorized by error domain (Validation, Conflict, Storage, Internal)
/// - Includes context fields for debugging (error_code, message, context)
///
/// Usage:
/// - The engine maps its own error enum onto ServiceError at the HTTP edge
/// - Error codes follow pattern: <CATEGORY>_<SPECIFIC>_<DETAIL>
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error categories that map to HTTP status codes and logging severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Validation errors (400 Bad Request)
    /// The wager was rejected before any durable change
    Validation,

    /// Lost optimistic-lock race (409 Conflict)
    /// Safe to retry
    Conflict,

    /// Storage errors (503 Service Unavailable)
    /// Durable store unavailable, write rejected, or commit timed out
    Storage,

    /// Internal service errors (500 Internal Server Error)
    /// Unexpected failures, configuration issues, programming errors
    Internal,

    /// Resource not found (404 Not Found)
    NotFound,
}

impl ErrorCategory {
    /// Map error category to HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::Validation => 400,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Storage => 503,
            ErrorCategory::Internal => 500,
            ErrorCategory::NotFound => 404,
        }
    }

    /// Map error category to log level
    pub fn log_level(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "warn",
            ErrorCategory::Conflict => "warn",
            ErrorCategory::Storage => "error",
            ErrorCategory::Internal => "error",
            ErrorCategory::NotFound => "info",
        }
    }

    /// Whether a caller may resubmit the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Conflict | ErrorCategory::Storage)
    }
}

/// Standard error codes used across all services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    // Validation errors
    pub const VALIDATION_INVALID_STAKE: ErrorCode = ErrorCode("VALIDATION_INVALID_STAKE");
    pub const VALIDATION_INSUFFICIENT_FUNDS: ErrorCode = ErrorCode("VALIDATION_INSUFFICIENT_FUNDS");
    pub const VALIDATION_GAME_INACTIVE: ErrorCode = ErrorCode("VALIDATION_GAME_INACTIVE");
    pub const VALIDATION_UNSUPPORTED_GAME: ErrorCode = ErrorCode("VALIDATION_UNSUPPORTED_GAME");
    pub const VALIDATION_INVALID_HAND_ACTION: ErrorCode = ErrorCode("VALIDATION_INVALID_HAND_ACTION");
    pub const VALIDATION_INVALID_INPUT: ErrorCode = ErrorCode("VALIDATION_INVALID_INPUT");
    pub const VALIDATION_MISSING_FIELD: ErrorCode = ErrorCode("VALIDATION_MISSING_FIELD");

    // Conflict errors
    pub const CONFLICT_CONCURRENT_SETTLEMENT: ErrorCode = ErrorCode("CONFLICT_CONCURRENT_SETTLEMENT");
    pub const CONFLICT_ACCOUNT_EXISTS: ErrorCode = ErrorCode("CONFLICT_ACCOUNT_EXISTS");

    // Storage errors
    pub const STORAGE_PERSISTENCE_FAILURE: ErrorCode = ErrorCode("STORAGE_PERSISTENCE_FAILURE");
    pub const STORAGE_COMMIT_TIMEOUT: ErrorCode = ErrorCode("STORAGE_COMMIT_TIMEOUT");

    // Internal errors
    pub const INTERNAL_UNEXPECTED: ErrorCode = ErrorCode("INTERNAL_UNEXPECTED");
    pub const INTERNAL_CONFIGURATION: ErrorCode = ErrorCode("INTERNAL_CONFIGURATION");
    pub const INTERNAL_SERIALIZATION: ErrorCode = ErrorCode("INTERNAL_SERIALIZATION");

    // Resource errors
    pub const NOT_FOUND_GAME: ErrorCode = ErrorCode("NOT_FOUND_GAME");
    pub const NOT_FOUND_ACCOUNT: ErrorCode = ErrorCode("NOT_FOUND_ACCOUNT");
    pub const NOT_FOUND_HAND: ErrorCode = ErrorCode("NOT_FOUND_HAND");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Standardized error structure used across all services
///
/// This provides consistent error reporting with:
/// - Structured error codes for programmatic handling
/// - Human-readable messages
/// - Optional context for debugging
/// - Category-based classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceError {
    /// Error category (determines status code and log level)
    pub category: ErrorCategory,

    /// Structured error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context (e.g., bounds, ids)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ServiceError {
    /// Create a new ServiceError
    pub fn new(category: ErrorCategory, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.as_str().to_string(),
            message: message.into(),
            context: None,
        }
    }

    /// Add context to an error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    // Validation error constructors
    pub fn invalid_stake(stake: impl fmt::Display, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Validation,
            ErrorCode::VALIDATION_INVALID_STAKE,
            format!("Invalid stake: {}", stake),
        )
        .with_context(format!("min: {}, max: {}", min, max))
    }

    pub fn insufficient_funds(required: impl fmt::Display, available: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Validation,
            ErrorCode::VALIDATION_INSUFFICIENT_FUNDS,
            "Insufficient funds",
        )
        .with_context(format!("required: {}, available: {}", required, available))
    }

    pub fn game_inactive(game_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Validation,
            ErrorCode::VALIDATION_GAME_INACTIVE,
            format!("Game is not active: {}", game_id),
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, ErrorCode::VALIDATION_INVALID_INPUT, message)
    }

    // Conflict error constructors
    pub fn concurrency_conflict(account_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Conflict,
            ErrorCode::CONFLICT_CONCURRENT_SETTLEMENT,
            "Concurrent settlement on the same account, retry the wager",
        )
        .with_context(format!("account: {}", account_id))
    }

    // Storage error constructors
    pub fn persistence_failure(error: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Storage,
            ErrorCode::STORAGE_PERSISTENCE_FAILURE,
            "Settlement could not be persisted; no funds were moved",
        )
        .with_context(error.to_string())
    }

    // Resource not found constructors
    pub fn game_not_found(game_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::NotFound,
            ErrorCode::NOT_FOUND_GAME,
            format!("Game not found: {}", game_id),
        )
    }

    pub fn account_not_found(account_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::NotFound,
            ErrorCode::NOT_FOUND_ACCOUNT,
            format!("Account not found: {}", account_id),
        )
    }

    pub fn hand_not_found(hand_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::NotFound,
            ErrorCode::NOT_FOUND_HAND,
            format!("Hand not found: {}", hand_id),
        )
    }

    // Internal error constructors
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, ErrorCode::INTERNAL_UNEXPECTED, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, ErrorCode::INTERNAL_CONFIGURATION, message)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "[{}] {}: {}", self.code, self.message, context)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServiceError {}

// Convenience type alias
pub type Result<T> = std::result::Result<T, ServiceError>;
