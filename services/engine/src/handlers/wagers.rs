use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::Credits;
use uuid::Uuid;
use validator::Validate;

use super::check_account_id;
use crate::{
    domain::GameId,
    errors::Result,
    extractors::ValidatedJson,
    outcome::blackjack::HandAction,
    settlement::{BlackjackHandReceipt, SlotWagerReceipt},
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct WagerRequest {
    #[validate(custom = "check_account_id")]
    pub account_id: String,
    pub game_id: GameId,
    pub bet_amount: Credits,
}

#[derive(Debug, Deserialize, Validate)]
pub struct HandActionRequest {
    #[validate(custom = "check_account_id")]
    pub account_id: String,
    #[validate(length(min = 1, max = 16))]
    pub action: String,
}

pub async fn spin_slots(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<WagerRequest>,
) -> Result<Json<SlotWagerReceipt>> {
    let receipt = state
        .coordinator
        .resolve_slot_wager(&req.account_id, req.game_id, req.bet_amount)
        .await?;
    state.stats.invalidate(&req.account_id).await;
    Ok(Json(receipt))
}

pub async fn deal_blackjack(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<WagerRequest>,
) -> Result<Json<BlackjackHandReceipt>> {
    let receipt = state
        .coordinator
        .resolve_blackjack_deal(&req.account_id, req.game_id, req.bet_amount)
        .await?;
    if receipt.settlement.is_some() {
        state.stats.invalidate(&req.account_id).await;
    }
    Ok(Json(receipt))
}

pub async fn blackjack_action(
    State(state): State<AppState>,
    Path(hand_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<HandActionRequest>,
) -> Result<Json<BlackjackHandReceipt>> {
    let action: HandAction = req.action.parse()?;
    let receipt = state
        .coordinator
        .blackjack_action(&req.account_id, hand_id, action)
        .await?;
    if receipt.settlement.is_some() {
        state.stats.invalidate(&req.account_id).await;
    }
    Ok(Json(receipt))
}
