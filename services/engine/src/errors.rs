use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared::errors::{ErrorCategory, ErrorCode, ServiceError};
use shared::{Credits, ValidationError};
use uuid::Uuid;

use crate::domain::GameId;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unknown game: {0}")]
    UnknownGame(GameId),

    #[error("Game is not active: {0}")]
    GameInactive(GameId),

    #[error("Game {game_id} does not support {requested} wagers")]
    UnsupportedGame { game_id: GameId, requested: &'static str },

    #[error("Stake {stake} outside [{min}, {max}]")]
    InvalidStake { stake: Credits, min: Credits, max: Credits },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Credits, available: Credits },

    #[error("Concurrent settlement on account {account_id}")]
    ConcurrencyConflict { account_id: String },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Settlement commit timed out after {0} ms")]
    SettlementTimeout(u64),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Hand not found: {0}")]
    HandNotFound(Uuid),

    #[error("Invalid action {action} for hand {hand_id}: {reason}")]
    InvalidHandAction { hand_id: Uuid, action: String, reason: String },

    #[error("Invalid game configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the settlement coordinator may transparently re-run the attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict { .. })
    }

    /// Short machine code used for metrics labels and the error envelope
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::UnknownGame(_) => ErrorCode::NOT_FOUND_GAME,
            AppError::GameInactive(_) => ErrorCode::VALIDATION_GAME_INACTIVE,
            AppError::UnsupportedGame { .. } => ErrorCode::VALIDATION_UNSUPPORTED_GAME,
            AppError::InvalidStake { .. } => ErrorCode::VALIDATION_INVALID_STAKE,
            AppError::InsufficientFunds { .. } => ErrorCode::VALIDATION_INSUFFICIENT_FUNDS,
            AppError::ConcurrencyConflict { .. } => ErrorCode::CONFLICT_CONCURRENT_SETTLEMENT,
            AppError::PersistenceFailure(_) => ErrorCode::STORAGE_PERSISTENCE_FAILURE,
            AppError::SettlementTimeout(_) => ErrorCode::STORAGE_COMMIT_TIMEOUT,
            AppError::AccountNotFound(_) => ErrorCode::NOT_FOUND_ACCOUNT,
            AppError::AccountExists(_) => ErrorCode::CONFLICT_ACCOUNT_EXISTS,
            AppError::HandNotFound(_) => ErrorCode::NOT_FOUND_HAND,
            AppError::InvalidHandAction { .. } => ErrorCode::VALIDATION_INVALID_HAND_ACTION,
            AppError::InvalidConfiguration(_) => ErrorCode::INTERNAL_CONFIGURATION,
            AppError::InvalidInput(_) => ErrorCode::VALIDATION_INVALID_INPUT,
            AppError::Internal(_) => ErrorCode::INTERNAL_UNEXPECTED,
        }
    }

    /// Map onto the shared error envelope
    pub fn service_error(&self) -> ServiceError {
        match self {
            AppError::UnknownGame(id) => ServiceError::game_not_found(id),
            AppError::GameInactive(id) => ServiceError::game_inactive(id),
            AppError::InvalidStake { stake, min, max } => ServiceError::invalid_stake(stake, min, max),
            AppError::InsufficientFunds { required, available } => {
                ServiceError::insufficient_funds(required, available)
            }
            AppError::ConcurrencyConflict { account_id } => ServiceError::concurrency_conflict(account_id),
            AppError::PersistenceFailure(reason) => ServiceError::persistence_failure(reason),
            AppError::AccountNotFound(id) => ServiceError::account_not_found(id),
            AppError::HandNotFound(id) => ServiceError::hand_not_found(id),
            AppError::InvalidConfiguration(reason) => ServiceError::configuration(reason.clone()),
            AppError::InvalidInput(reason) => ServiceError::invalid_input(reason.clone()),
            // Internal details stay in the logs
            AppError::Internal(_) => ServiceError::internal("Internal server error"),
            other => {
                let category = match other {
                    AppError::SettlementTimeout(_) => ErrorCategory::Storage,
                    AppError::AccountExists(_) => ErrorCategory::Conflict,
                    _ => ErrorCategory::Validation,
                };
                ServiceError::new(category, other.code(), other.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        AppError::PersistenceFailure(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::PersistenceFailure(error.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(error: redis::RedisError) -> Self {
        AppError::PersistenceFailure(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::PersistenceFailure(format!("corrupt stored record: {}", error))
    }
}

impl From<ValidationError> for AppError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::AmountOverflow => {
                AppError::Internal(anyhow::anyhow!("credit arithmetic overflow"))
            }
            other => AppError::InvalidInput(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = self.service_error();

        match error.category {
            ErrorCategory::Internal | ErrorCategory::Storage => {
                tracing::error!(error_code = %error.code, "Request failed: {:?}", self);
            }
            ErrorCategory::Validation | ErrorCategory::Conflict => {
                tracing::warn!(error_code = %error.code, error_message = %error.message, "Request rejected");
            }
            ErrorCategory::NotFound => {
                tracing::info!(error_code = %error.code, "Resource not found");
            }
        }

        metrics::counter!("errors_total", "code" => error.code.clone()).increment(1);

        let status = StatusCode::from_u16(error.category.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(json!({
            "error": {
                "code": error.code,
                "message": error.message,
                "category": error.category,
                "context": error.context,
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_not_retryable() {
        let stake = AppError::InvalidStake {
            stake: Credits::from_minor(1),
            min: Credits::from_minor(5),
            max: Credits::from_minor(5000),
        };
        assert!(!stake.is_retryable());
        assert!(!AppError::GameInactive(1).is_retryable());
        assert!(AppError::ConcurrencyConflict { account_id: "a".into() }.is_retryable());
    }

    #[test]
    fn test_service_error_mapping() {
        let error = AppError::InsufficientFunds {
            required: Credits::from_minor(1000),
            available: Credits::from_minor(250),
        }
        .service_error();
        assert_eq!(error.category, ErrorCategory::Validation);
        assert_eq!(error.code, "VALIDATION_INSUFFICIENT_FUNDS");
        assert_eq!(error.context.as_deref(), Some("required: 10.00, available: 2.50"));

        let error = AppError::UnknownGame(7).service_error();
        assert_eq!(error.category, ErrorCategory::NotFound);

        let error = AppError::SettlementTimeout(5000).service_error();
        assert_eq!(error.category, ErrorCategory::Storage);
        assert_eq!(error.code, "STORAGE_COMMIT_TIMEOUT");

        let error = AppError::PersistenceFailure("disk full".into()).service_error();
        assert_eq!(error.category.status_code(), 503);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let error = AppError::Internal(anyhow::anyhow!("secret pool state")).service_error();
        assert!(!error.message.contains("secret"));
    }
}
