// Library interface for the engine - exposes modules for the binary and tests

pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod ledger;
pub mod outcome;
pub mod reconciliation;
pub mod repository;
pub mod settlement;
pub mod state;
pub mod stats;

use axum::{
    routing::{get, post},
    Router,
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        .route("/health/detailed", get(handlers::health::detailed_health))
        // Catalog
        .route("/api/games", get(handlers::games::list_games))
        .route("/api/games/:game_id", get(handlers::games::get_game))
        // Wagers
        .route("/api/games/slots/spin", post(handlers::wagers::spin_slots))
        .route("/api/games/blackjack/deal", post(handlers::wagers::deal_blackjack))
        .route("/api/games/blackjack/:hand_id/action", post(handlers::wagers::blackjack_action))
        // Accounts
        .route("/api/accounts", post(handlers::accounts::open_account))
        .route("/api/accounts/:account_id", get(handlers::accounts::get_account))
        .route("/api/accounts/:account_id/transactions", get(handlers::accounts::list_transactions))
        .route("/api/accounts/:account_id/stats", get(handlers::accounts::get_stats))
        // Metrics
        .route("/metrics", get(handlers::metrics::metrics_handler))
        // State
        .with_state(state)
        // Middleware
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}
