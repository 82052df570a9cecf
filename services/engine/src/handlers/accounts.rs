use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{DEFAULT_HISTORY_PAGE, MAX_HISTORY_PAGE};
use validator::Validate;

use super::check_account_id;
use crate::{
    domain::{Account, LedgerEntry},
    errors::{AppError, Result},
    extractors::ValidatedJson,
    stats::PlayerStats,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct OpenAccountRequest {
    #[validate(custom = "check_account_id")]
    pub account_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<LedgerEntry>,
    pub limit: i64,
    pub offset: i64,
}

async fn existing_account(state: &AppState, account_id: &str) -> Result<Account> {
    state
        .store
        .find_account(account_id)
        .await?
        .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
}

pub async fn open_account(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<OpenAccountRequest>,
) -> Result<(StatusCode, Json<Account>)> {
    let account = state
        .store
        .open_account(&req.account_id, state.config.accounts.starting_balance)
        .await?;

    tracing::info!(
        account_id = %account.account_id,
        balance = %account.balance,
        "Account opened"
    );
    metrics::counter!("accounts_opened_total").increment(1);

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(State(state): State<AppState>, Path(account_id): Path<String>) -> Result<Json<Account>> {
    Ok(Json(existing_account(&state, &account_id).await?))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_PAGE).clamp(1, MAX_HISTORY_PAGE);
    let offset = query.offset.unwrap_or(0).max(0);

    existing_account(&state, &account_id).await?;
    let entries = state.store.entries_for_account(&account_id, limit, offset).await?;

    Ok(Json(HistoryResponse { entries, limit, offset }))
}

pub async fn get_stats(State(state): State<AppState>, Path(account_id): Path<String>) -> Result<Json<PlayerStats>> {
    existing_account(&state, &account_id).await?;
    Ok(Json(state.stats.get(&account_id).await?))
}
