use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{
    domain::{GameDefinition, GameId},
    errors::{AppError, Result},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct ListGamesResponse {
    pub games: Vec<GameDefinition>,
}

pub async fn list_games(State(state): State<AppState>) -> Result<Json<ListGamesResponse>> {
    let games = state.catalog.list_active_games().await?;
    Ok(Json(ListGamesResponse { games }))
}

pub async fn get_game(State(state): State<AppState>, Path(game_id): Path<GameId>) -> Result<Json<GameDefinition>> {
    let game = state
        .catalog
        .find_game(game_id)
        .await?
        .ok_or(AppError::UnknownGame(game_id))?;
    Ok(Json(game))
}
