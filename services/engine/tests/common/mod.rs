//! Shared fixtures for integration tests: a seeded in-memory engine
#![allow(dead_code)]

use serde_json::Value;
use shared::Credits;
use std::sync::Arc;
use std::time::Duration;

use engine::config::Config;
use engine::repository::{seed_catalog, InMemoryStore, LedgerStore};
use engine::settlement::{RetryPolicy, SeededSource, SettlementConfig, SettlementCoordinator};
use engine::state::AppState;

// Seeded catalog ids
pub const LUCKY_SEVENS: i64 = 1;
pub const TREASURE_QUEST: i64 = 2;
pub const PHARAOHS_GOLD: i64 = 3;
pub const CLASSIC_BLACKJACK: i64 = 4;
pub const EUROPEAN_ROULETTE: i64 = 5;

pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub coordinator: SettlementCoordinator,
}

pub fn credits(s: &str) -> Credits {
    s.parse().unwrap()
}

pub fn fast_config() -> SettlementConfig {
    SettlementConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
        },
        commit_timeout: Duration::from_secs(5),
    }
}

impl TestContext {
    pub async fn new(seed: u64) -> Self {
        Self::with_config(seed, fast_config()).await
    }

    pub async fn with_config(seed: u64, config: SettlementConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        seed_catalog(store.as_ref()).await.unwrap();
        let coordinator = SettlementCoordinator::new(store.clone(), store.clone(), Arc::new(SeededSource::new(seed)), config);
        Self { store, coordinator }
    }

    pub async fn open(&self, account_id: &str, balance: &str) {
        self.store.open_account(account_id, credits(balance)).await.unwrap();
    }

    pub async fn balance(&self, account_id: &str) -> Credits {
        self.store.find_account(account_id).await.unwrap().unwrap().balance
    }
}

/// App state over a fresh seeded in-memory store with reproducible outcomes
pub async fn test_state(seed: u64) -> (Arc<InMemoryStore>, AppState) {
    test_state_with(seed, Config::default()).await
}

pub async fn test_state_with(seed: u64, config: Config) -> (Arc<InMemoryStore>, AppState) {
    let store = Arc::new(InMemoryStore::new());
    seed_catalog(store.as_ref()).await.unwrap();
    let state = AppState::new(config, store.clone(), store.clone(), Arc::new(SeededSource::new(seed)));
    (store, state)
}

/// Split an error envelope into (code, message, category)
pub fn parse_error(json: &Value) -> Option<(String, String, String)> {
    let error = json.get("error")?;
    Some((
        error.get("code")?.as_str()?.to_string(),
        error.get("message")?.as_str()?.to_string(),
        error.get("category")?.as_str()?.to_string(),
    ))
}
