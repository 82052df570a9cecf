//! Redis-backed ledger and catalog
//!
//! Accounts live in hashes, entries and results in per-account lists of JSON
//! documents. Every balance change goes through `COMMIT_SCRIPT`, which checks
//! the account version and writes everything in one script execution.

mod deserialization;
mod keys;
mod lua_scripts;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use shared::Credits;
use uuid::Uuid;

use super::{CommitReceipt, GameCatalog, HandWrite, LedgerCommit, LedgerStore};
use crate::domain::{Account, BlackjackHand, GameDefinition, GameId, GameResult, LedgerEntry};
use crate::errors::{AppError, Result};

pub use deserialization::*;
pub use keys::*;
pub use lua_scripts::*;

pub struct RedisStore {
    redis: ConnectionManager,
}

impl RedisStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let redis = client.get_connection_manager().await?;
        Ok(Self::new(redis))
    }
}

#[async_trait]
impl GameCatalog for RedisStore {
    async fn find_game(&self, game_id: GameId) -> Result<Option<GameDefinition>> {
        let mut redis_conn = self.redis.clone();
        let raw: Option<String> = redis_conn.hget(games_key(), game_id).await?;
        Ok(raw.map(|doc| serde_json::from_str(&doc)).transpose()?)
    }

    async fn list_games(&self) -> Result<Vec<GameDefinition>> {
        let mut redis_conn = self.redis.clone();
        let raw: Vec<String> = redis_conn.hvals(games_key()).await?;
        let mut games: Vec<GameDefinition> = parse_documents(&raw)?;
        games.sort_by_key(|game| game.id);
        Ok(games)
    }

    async fn insert_game(&self, mut definition: GameDefinition) -> Result<GameDefinition> {
        let mut redis_conn = self.redis.clone();
        definition.id = redis_conn.incr(game_id_sequence_key(), 1).await?;
        let doc = serde_json::to_string(&definition)?;
        let _: () = redis_conn.hset(games_key(), definition.id, doc).await?;
        Ok(definition)
    }
}

#[async_trait]
impl LedgerStore for RedisStore {
    async fn find_account(&self, account_id: &str) -> Result<Option<Account>> {
        let mut redis_conn = self.redis.clone();
        load_account(&mut redis_conn, account_id).await
    }

    async fn open_account(&self, account_id: &str, initial_balance: Credits) -> Result<Account> {
        let mut redis_conn = self.redis.clone();
        let now_ms = Utc::now().timestamp_millis();

        let created: i32 = Script::new(OPEN_ACCOUNT_SCRIPT)
            .key(account_key(account_id))
            .key(account_index_key())
            .arg(account_id)
            .arg(initial_balance.as_minor())
            .arg(now_ms)
            .invoke_async(&mut redis_conn)
            .await?;

        if created == 0 {
            return Err(AppError::AccountExists(account_id.to_string()));
        }

        load_account(&mut redis_conn, account_id)
            .await?
            .ok_or_else(|| AppError::PersistenceFailure(format!("account {} vanished after open", account_id)))
    }

    async fn account_ids(&self) -> Result<Vec<String>> {
        let mut redis_conn = self.redis.clone();
        let ids: Vec<String> = redis_conn.zrange(account_index_key(), 0, -1).await?;
        Ok(ids)
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt> {
        let mut redis_conn = self.redis.clone();
        let receipt = commit.receipt();
        let now_ms = Utc::now().timestamp_millis();

        let hand_open = commit.hand.as_ref().is_some_and(|write| write.hand().is_open());
        let (hand_mode, hand_key_id, hand_expected, hand_version, hand_doc) = match &commit.hand {
            None => ("none", Uuid::nil(), -1, -1, String::new()),
            Some(HandWrite::Open(hand)) => ("open", hand.hand_id, -1, hand.version, serde_json::to_string(hand)?),
            Some(HandWrite::Update { hand, expected_version }) => (
                "update",
                hand.hand_id,
                *expected_version,
                hand.version,
                serde_json::to_string(hand)?,
            ),
        };
        // Entry-less commits (a lost blackjack hand) keep the stored sequence
        let last_sequence = commit
            .entries
            .last()
            .map(|entry| entry.sequence.to_string())
            .unwrap_or_default();
        let result_doc = match &commit.result {
            Some(result) => serde_json::to_string(result)?,
            None => String::new(),
        };

        let script = Script::new(COMMIT_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(account_key(&commit.account_id))
            .key(ledger_key(&commit.account_id))
            .key(results_key(&commit.account_id))
            .key(commit_key(commit.commit_id))
            .key(hand_key(hand_key_id))
            .key(open_hands_index_key())
            .arg(commit.expected_version)
            .arg(commit.new_balance.as_minor())
            .arg(last_sequence)
            .arg(now_ms)
            .arg(serde_json::to_string(&receipt)?)
            .arg(result_doc)
            .arg(hand_mode)
            .arg(hand_expected)
            .arg(hand_version)
            .arg(hand_doc)
            .arg(hand_key_id.to_string())
            .arg(if hand_open { "1" } else { "0" });
        for entry in &commit.entries {
            invocation.arg(serde_json::to_string(entry)?);
        }

        let status: i32 = invocation.invoke_async(&mut redis_conn).await?;
        match status {
            1 => Ok(receipt),
            -1 => Err(AppError::AccountNotFound(commit.account_id)),
            _ => Err(AppError::ConcurrencyConflict {
                account_id: commit.account_id,
            }),
        }
    }

    async fn find_commit(&self, commit_id: Uuid) -> Result<Option<CommitReceipt>> {
        let mut redis_conn = self.redis.clone();
        let raw: Option<String> = redis_conn.get(commit_key(commit_id)).await?;
        Ok(raw.map(|doc| serde_json::from_str(&doc)).transpose()?)
    }

    async fn entries_for_account(&self, account_id: &str, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let mut redis_conn = self.redis.clone();

        // Newest entries sit at the tail
        let start = -(offset.max(0) + limit) as isize;
        let end = -(offset.max(0) + 1) as isize;
        let raw: Vec<String> = redis_conn.lrange(ledger_key(account_id), start, end).await?;

        let mut entries: Vec<LedgerEntry> = parse_documents(&raw)?;
        entries.reverse();
        Ok(entries)
    }

    async fn entry_chain(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        let mut redis_conn = self.redis.clone();
        let raw: Vec<String> = redis_conn.lrange(ledger_key(account_id), 0, -1).await?;
        parse_documents(&raw)
    }

    async fn results_for_account(&self, account_id: &str) -> Result<Vec<GameResult>> {
        let mut redis_conn = self.redis.clone();
        let raw: Vec<String> = redis_conn.lrange(results_key(account_id), 0, -1).await?;
        parse_documents(&raw)
    }

    async fn find_hand(&self, hand_id: Uuid) -> Result<Option<BlackjackHand>> {
        let mut redis_conn = self.redis.clone();
        let raw: Option<String> = redis_conn.hget(hand_key(hand_id), "data").await?;
        Ok(raw.map(|doc| serde_json::from_str(&doc)).transpose()?)
    }

    async fn save_hand(&self, hand: &BlackjackHand, expected_version: i64) -> Result<()> {
        let mut redis_conn = self.redis.clone();
        let updated: i32 = Script::new(SAVE_HAND_SCRIPT)
            .key(hand_key(hand.hand_id))
            .key(open_hands_index_key())
            .arg(expected_version)
            .arg(hand.version)
            .arg(serde_json::to_string(hand)?)
            .arg(hand.hand_id.to_string())
            .arg(Utc::now().timestamp_millis())
            .arg(if hand.is_open() { "1" } else { "0" })
            .invoke_async(&mut redis_conn)
            .await?;

        if updated == 1 {
            Ok(())
        } else {
            Err(AppError::ConcurrencyConflict {
                account_id: hand.account_id.clone(),
            })
        }
    }

    async fn open_hands(&self) -> Result<Vec<BlackjackHand>> {
        let mut redis_conn = self.redis.clone();
        let hand_ids: Vec<String> = redis_conn.zrange(open_hands_index_key(), 0, -1).await?;

        let mut hands = Vec::with_capacity(hand_ids.len());
        for raw_id in hand_ids {
            let hand_id = Uuid::parse_str(&raw_id)
                .map_err(|_| AppError::PersistenceFailure(format!("corrupt open hand id {:?}", raw_id)))?;
            let raw: Option<String> = redis_conn.hget(hand_key(hand_id), "data").await?;
            if let Some(doc) = raw {
                let hand: BlackjackHand = serde_json::from_str(&doc)?;
                if hand.is_open() {
                    hands.push(hand);
                }
            }
        }
        Ok(hands)
    }

    async fn health_check(&self) -> Result<()> {
        let mut redis_conn = self.redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut redis_conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AccountLedger, LedgerEntryDraft};
    use std::sync::Arc;

    async fn store() -> RedisStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        RedisStore::connect(&url).await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_commit_and_page_entries() {
        let store = Arc::new(store().await);
        let account_id = format!("redis-{}", Uuid::new_v4());
        store.open_account(&account_id, Credits::from_minor(1000)).await.unwrap();

        let ledger = AccountLedger::new(store.clone());
        for amount in 1..=3 {
            ledger
                .apply_entries(&account_id, &[LedgerEntryDraft::deposit(Credits::from_minor(amount), "d")])
                .await
                .unwrap();
        }

        let account = store.find_account(&account_id).await.unwrap().unwrap();
        assert_eq!(account.balance.as_minor(), 1006);
        assert_eq!(account.version, 3);
        assert_eq!(account.last_sequence, 3);

        let page = store.entries_for_account(&account_id, 2, 0).await.unwrap();
        let sequences: Vec<_> = page.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 2]);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_open_account_twice_conflicts() {
        let store = store().await;
        let account_id = format!("redis-{}", Uuid::new_v4());
        store.open_account(&account_id, Credits::ZERO).await.unwrap();
        assert!(matches!(
            store.open_account(&account_id, Credits::ZERO).await,
            Err(AppError::AccountExists(_))
        ));
    }
}
