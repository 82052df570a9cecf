pub mod accounts;
pub mod games;
pub mod health;
pub mod metrics;
pub mod wagers;

/// `validator` hook for account identifiers supplied by the session layer
pub(crate) fn check_account_id(account_id: &str) -> Result<(), validator::ValidationError> {
    shared::validate_account_id(account_id).map_err(|e| {
        let mut error = validator::ValidationError::new("account_id");
        error.message = Some(e.to_string().into());
        error
    })
}
