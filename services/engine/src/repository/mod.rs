pub mod memory;
pub mod postgres;
pub mod redis_store;

pub use memory::{FaultPlan, InMemoryStore};
pub use postgres::PostgresStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::Credits;
use uuid::Uuid;

use crate::catalog::default_catalog;
use crate::domain::{Account, BlackjackHand, GameDefinition, GameId, GameResult, LedgerEntry};
use crate::errors::Result;
use crate::ledger::AppliedEntries;

/// Read side of the externally owned game catalog
#[async_trait]
pub trait GameCatalog: Send + Sync {
    async fn find_game(&self, game_id: GameId) -> Result<Option<GameDefinition>>;
    async fn list_games(&self) -> Result<Vec<GameDefinition>>;
    /// Store a new definition and return it with its assigned id
    async fn insert_game(&self, definition: GameDefinition) -> Result<GameDefinition>;

    async fn list_active_games(&self) -> Result<Vec<GameDefinition>> {
        Ok(self
            .list_games()
            .await?
            .into_iter()
            .filter(|game| game.is_active)
            .collect())
    }
}

/// Seed the default games into an empty catalog. Returns how many were added.
pub async fn seed_catalog(catalog: &dyn GameCatalog) -> Result<usize> {
    if !catalog.list_games().await?.is_empty() {
        return Ok(0);
    }

    let games = default_catalog();
    let count = games.len();
    for game in games {
        game.validate()?;
        let stored = catalog.insert_game(game).await?;
        tracing::info!(game_id = stored.id, name = %stored.name, kind = %stored.kind(), "Seeded game");
    }
    Ok(count)
}

/// Hand state written alongside a ledger commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HandWrite {
    /// Insert a new hand at version 1
    Open(BlackjackHand),
    /// Replace the hand stored at `expected_version`
    Update { hand: BlackjackHand, expected_version: i64 },
}

impl HandWrite {
    pub fn hand(&self) -> &BlackjackHand {
        match self {
            HandWrite::Open(hand) => hand,
            HandWrite::Update { hand, .. } => hand,
        }
    }
}

/// One all-or-nothing unit of work against a single account
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCommit {
    pub commit_id: Uuid,
    pub account_id: String,
    /// Account version the entries were chained against
    pub expected_version: i64,
    pub new_balance: Credits,
    pub entries: Vec<LedgerEntry>,
    pub result: Option<GameResult>,
    pub hand: Option<HandWrite>,
}

impl LedgerCommit {
    pub fn new(commit_id: Uuid, account: &Account, applied: AppliedEntries) -> Self {
        Self {
            commit_id,
            account_id: account.account_id.clone(),
            expected_version: account.version,
            new_balance: applied.new_balance,
            entries: applied.entries,
            result: None,
            hand: None,
        }
    }

    pub fn with_result(mut self, result: GameResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_hand(mut self, hand: HandWrite) -> Self {
        self.hand = Some(hand);
        self
    }

    pub fn last_sequence(&self, fallback: i64) -> i64 {
        self.entries.last().map_or(fallback, |entry| entry.sequence)
    }

    pub fn receipt(&self) -> CommitReceipt {
        CommitReceipt {
            commit_id: self.commit_id,
            account_id: self.account_id.clone(),
            new_balance: self.new_balance,
            new_version: self.expected_version + 1,
            entries: self.entries.clone(),
            result: self.result.clone(),
            hand_id: self.hand.as_ref().map(|write| write.hand().hand_id),
        }
    }
}

/// What a landed commit wrote, kept so a timed-out caller can find out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub commit_id: Uuid,
    pub account_id: String,
    pub new_balance: Credits,
    pub new_version: i64,
    pub entries: Vec<LedgerEntry>,
    pub result: Option<GameResult>,
    pub hand_id: Option<Uuid>,
}

/// Durable balance, history, results and open hands
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_account(&self, account_id: &str) -> Result<Option<Account>>;

    /// Fails with `AccountExists` if the id is taken
    async fn open_account(&self, account_id: &str, initial_balance: Credits) -> Result<Account>;

    async fn account_ids(&self) -> Result<Vec<String>>;

    /// Apply the commit atomically, or fail with `ConcurrencyConflict` when the
    /// account or hand version moved, leaving everything untouched.
    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt>;

    async fn find_commit(&self, commit_id: Uuid) -> Result<Option<CommitReceipt>>;

    /// Newest first
    async fn entries_for_account(&self, account_id: &str, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>>;

    /// Full history in sequence order
    async fn entry_chain(&self, account_id: &str) -> Result<Vec<LedgerEntry>>;

    async fn results_for_account(&self, account_id: &str) -> Result<Vec<GameResult>>;

    async fn find_hand(&self, hand_id: Uuid) -> Result<Option<BlackjackHand>>;

    /// Replace a hand without touching the ledger; `hand.version` is the new version
    async fn save_hand(&self, hand: &BlackjackHand, expected_version: i64) -> Result<()>;

    /// Hands still waiting on the player, oldest activity first
    async fn open_hands(&self) -> Result<Vec<BlackjackHand>>;

    async fn health_check(&self) -> Result<()>;
}
