/// HTTP surface tests through the router, backed by the in-memory store
mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use engine::config::Config;
use engine::repository::LedgerStore;
use common::{parse_error, test_state, test_state_with, CLASSIC_BLACKJACK, EUROPEAN_ROULETTE, LUCKY_SEVENS};
use serde_json::{json, Value};
use uuid::Uuid;

async fn server(seed: u64) -> TestServer {
    let (_, state) = test_state(seed).await;
    TestServer::new(engine::build_router(state)).unwrap()
}

async fn open_account(server: &TestServer, account_id: &str) {
    let response = server.post("/api/accounts").json(&json!({ "account_id": account_id })).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
}

fn error_of(body: &Value) -> (String, String, String) {
    parse_error(body).expect("error envelope")
}

#[tokio::test]
async fn test_health() {
    let server = server(1).await;
    let body: Value = server.get("/health").await.json();
    assert_eq!(body["status"], "healthy");

    let body: Value = server.get("/health/detailed").await.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["storage"]["backend"], "memory");
}

#[tokio::test]
async fn test_catalog_lists_active_games() {
    let server = server(1).await;
    let body: Value = server.get("/api/games").await.json();
    let games = body["games"].as_array().unwrap();
    assert_eq!(games.len(), 5);
    assert_eq!(games[0]["name"], "Lucky Sevens");
    assert_eq!(games[0]["min_bet"], "0.05");

    let game: Value = server.get(&format!("/api/games/{}", CLASSIC_BLACKJACK)).await.json();
    assert_eq!(game["rules"]["type"], "blackjack");

    let missing = server.get("/api/games/999").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    let (code, _, category) = error_of(&missing.json());
    assert_eq!(code, "NOT_FOUND_GAME");
    assert_eq!(category, "NOT_FOUND");
}

#[tokio::test]
async fn test_open_account_once() {
    let server = server(1).await;
    open_account(&server, "alice").await;

    let account: Value = server.get("/api/accounts/alice").await.json();
    assert_eq!(account["balance"], "1000.00");
    assert_eq!(account["version"], 0);

    let duplicate = server.post("/api/accounts").json(&json!({ "account_id": "alice" })).await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

    let missing = server.get("/api/accounts/bob").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_slot_spin_updates_balance_history_and_stats() {
    let server = server(4).await;
    open_account(&server, "alice").await;

    let response = server
        .post("/api/games/slots/spin")
        .json(&json!({ "account_id": "alice", "game_id": LUCKY_SEVENS, "bet_amount": "2.00" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let receipt: Value = response.json();
    assert_eq!(receipt["grid"].as_array().unwrap().len(), 1);
    assert_eq!(receipt["grid"][0].as_array().unwrap().len(), 5);

    let account: Value = server.get("/api/accounts/alice").await.json();
    assert_eq!(account["balance"], receipt["new_balance"]);

    let history: Value = server.get("/api/accounts/alice/transactions").await.json();
    let entries = history["entries"].as_array().unwrap();
    let won = receipt["payout"] != "0.00";
    assert_eq!(entries.len(), if won { 2 } else { 1 });
    assert_eq!(entries.last().unwrap()["entry_type"], "bet");
    assert_eq!(entries.last().unwrap()["amount"], "-2.00");

    let stats: Value = server.get("/api/accounts/alice/stats").await.json();
    assert_eq!(stats["total_games"], 1);
    assert_eq!(stats["total_stake_amount"], "2.00");
}

#[tokio::test]
async fn test_history_paging_is_clamped() {
    let server = server(4).await;
    open_account(&server, "alice").await;
    for _ in 0..3 {
        server
            .post("/api/games/slots/spin")
            .json(&json!({ "account_id": "alice", "game_id": LUCKY_SEVENS, "bet_amount": "1.00" }))
            .await;
    }

    let page: Value = server
        .get("/api/accounts/alice/transactions")
        .add_query_param("limit", 1000)
        .add_query_param("offset", -5)
        .await
        .json();
    assert_eq!(page["limit"], 100);
    assert_eq!(page["offset"], 0);

    let page: Value = server
        .get("/api/accounts/alice/transactions")
        .add_query_param("limit", 1)
        .await
        .json();
    assert_eq!(page["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_wager_errors_render_envelope() {
    let server = server(4).await;
    open_account(&server, "alice").await;

    let stake = server
        .post("/api/games/slots/spin")
        .json(&json!({ "account_id": "alice", "game_id": LUCKY_SEVENS, "bet_amount": "0.01" }))
        .await;
    assert_eq!(stake.status_code(), StatusCode::BAD_REQUEST);
    let (code, _, category) = error_of(&stake.json());
    assert_eq!(code, "VALIDATION_INVALID_STAKE");
    assert_eq!(category, "VALIDATION");

    let roulette = server
        .post("/api/games/slots/spin")
        .json(&json!({ "account_id": "alice", "game_id": EUROPEAN_ROULETTE, "bet_amount": "1.00" }))
        .await;
    assert_eq!(roulette.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(&roulette.json()).0, "VALIDATION_UNSUPPORTED_GAME");
}

#[tokio::test]
async fn test_insufficient_funds_over_http() {
    let mut config = Config::default();
    config.accounts.starting_balance = "3.00".parse().unwrap();
    let (store, state) = test_state_with(4, config).await;
    let server = TestServer::new(engine::build_router(state)).unwrap();
    open_account(&server, "alice").await;

    let response = server
        .post("/api/games/slots/spin")
        .json(&json!({ "account_id": "alice", "game_id": LUCKY_SEVENS, "bet_amount": "5.00" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let (code, _, _) = error_of(&response.json());
    assert_eq!(code, "VALIDATION_INSUFFICIENT_FUNDS");

    let account = store.find_account("alice").await.unwrap().unwrap();
    assert_eq!(account.balance.to_string(), "3.00");
    assert_eq!(account.version, 0);
}

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let server = server(1).await;

    let missing = server
        .post("/api/games/slots/spin")
        .json(&json!({ "account_id": "alice", "game_id": LUCKY_SEVENS }))
        .await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
    let (code, message, category) = error_of(&missing.json());
    assert_eq!(code, "VALIDATION_MISSING_FIELD");
    assert!(message.contains("bet_amount"));
    assert_eq!(category, "VALIDATION");

    let bad_amount = server
        .post("/api/games/slots/spin")
        .json(&json!({ "account_id": "alice", "game_id": LUCKY_SEVENS, "bet_amount": "1.005" }))
        .await;
    assert_eq!(bad_amount.status_code(), StatusCode::BAD_REQUEST);

    let long_id = "x".repeat(65);
    let bad_id = server.post("/api/accounts").json(&json!({ "account_id": long_id })).await;
    assert_eq!(bad_id.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(&bad_id.json()).0, "VALIDATION_INVALID_INPUT");
}

#[tokio::test]
async fn test_blackjack_round_over_http() {
    let server = server(21).await;
    open_account(&server, "alice").await;

    let mut hand_id = None;
    for _ in 0..20 {
        let dealt: Value = server
            .post("/api/games/blackjack/deal")
            .json(&json!({ "account_id": "alice", "game_id": CLASSIC_BLACKJACK, "bet_amount": "10.00" }))
            .await
            .json();
        if let Some(id) = dealt["hand_id"].as_str() {
            assert_eq!(dealt["state"], "awaiting_player_action");
            assert!(dealt["settlement"].is_null());
            hand_id = Some(id.to_string());
            break;
        }
        assert_eq!(dealt["state"], "settled");
    }
    let hand_id = hand_id.expect("an open hand");

    let unknown = server
        .post(&format!("/api/games/blackjack/{}/action", hand_id))
        .json(&json!({ "account_id": "alice", "action": "surrender" }))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);

    let double = server
        .post(&format!("/api/games/blackjack/{}/action", hand_id))
        .json(&json!({ "account_id": "alice", "action": "double" }))
        .await;
    assert_eq!(error_of(&double.json()).0, "VALIDATION_INVALID_HAND_ACTION");

    let stood: Value = server
        .post(&format!("/api/games/blackjack/{}/action", hand_id))
        .json(&json!({ "account_id": "alice", "action": "stand" }))
        .await
        .json();
    assert_eq!(stood["state"], "settled");
    assert!(stood["settlement"]["dealer_cards"].as_array().unwrap().len() >= 2);

    let account: Value = server.get("/api/accounts/alice").await.json();
    assert_eq!(account["balance"], stood["new_balance"]);

    let gone = server
        .post(&format!("/api/games/blackjack/{}/action", Uuid::new_v4()))
        .json(&json!({ "account_id": "alice", "action": "hit" }))
        .await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
}
