use async_trait::async_trait;
use chrono::Utc;
use shared::Credits;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{CommitReceipt, GameCatalog, HandWrite, LedgerCommit, LedgerStore};
use crate::domain::{
    Account, BlackjackHand, EntryType, GameDefinition, GameId, GameResult, LedgerEntry, ResultClass,
};
use crate::errors::{AppError, Result};

/// Ledger and catalog on PostgreSQL. Every commit is one transaction holding
/// the account row lock.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with server-side limits of `commit_timeout` on every statement
    /// and on idle open transactions, so the database itself aborts a commit
    /// the coordinator has stopped waiting for.
    pub async fn connect(url: &str, pool_size: u32, commit_timeout: Duration) -> Result<Self> {
        let timeout_ms = commit_timeout.as_millis().to_string();
        let options = PgConnectOptions::from_str(url)?.options([
            ("statement_timeout", timeout_ms.as_str()),
            ("idle_in_transaction_session_timeout", timeout_ms.as_str()),
        ]);
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn corrupt(what: &str, value: &str) -> AppError {
    AppError::PersistenceFailure(format!("corrupt stored {}: {:?}", what, value))
}

fn game_from_row(row: &PgRow) -> Result<GameDefinition> {
    let rtp_bps: i32 = row.try_get("rtp_bps")?;
    Ok(GameDefinition {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        min_bet: Credits::from_minor(row.try_get("min_bet")?),
        max_bet: Credits::from_minor(row.try_get("max_bet")?),
        rtp_bps: rtp_bps.max(0) as u32,
        is_active: row.try_get("is_active")?,
        rules: serde_json::from_value(row.try_get("rules")?)?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        account_id: row.try_get("account_id")?,
        balance: Credits::from_minor(row.try_get("balance")?),
        initial_balance: Credits::from_minor(row.try_get("initial_balance")?),
        version: row.try_get("version")?,
        last_sequence: row.try_get("last_sequence")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let entry_type: String = row.try_get("entry_type")?;
    Ok(LedgerEntry {
        entry_id: row.try_get("entry_id")?,
        account_id: row.try_get("account_id")?,
        game_id: row.try_get("game_id")?,
        commit_id: row.try_get("commit_id")?,
        sequence: row.try_get("sequence")?,
        entry_type: EntryType::parse(&entry_type).ok_or_else(|| corrupt("entry type", &entry_type))?,
        amount: Credits::from_minor(row.try_get("amount")?),
        balance_before: Credits::from_minor(row.try_get("balance_before")?),
        balance_after: Credits::from_minor(row.try_get("balance_after")?),
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn result_from_row(row: &PgRow) -> Result<GameResult> {
    let classification: String = row.try_get("classification")?;
    Ok(GameResult {
        result_id: row.try_get("result_id")?,
        account_id: row.try_get("account_id")?,
        game_id: row.try_get("game_id")?,
        commit_id: row.try_get("commit_id")?,
        hand_id: row.try_get("hand_id")?,
        stake: Credits::from_minor(row.try_get("stake")?),
        payout: Credits::from_minor(row.try_get("payout")?),
        outcome: row.try_get("outcome")?,
        classification: ResultClass::parse(&classification)
            .ok_or_else(|| corrupt("classification", &classification))?,
        created_at: row.try_get("created_at")?,
    })
}

fn hand_from_row(row: &PgRow) -> Result<BlackjackHand> {
    Ok(BlackjackHand {
        hand_id: row.try_get("hand_id")?,
        account_id: row.try_get("account_id")?,
        game_id: row.try_get("game_id")?,
        stake: Credits::from_minor(row.try_get("stake")?),
        round: serde_json::from_value(row.try_get("round")?)?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const ENTRY_COLUMNS: &str = "entry_id, account_id, game_id, commit_id, sequence, entry_type, amount, \
                             balance_before, balance_after, description, created_at";

#[async_trait]
impl GameCatalog for PostgresStore {
    async fn find_game(&self, game_id: GameId) -> Result<Option<GameDefinition>> {
        let row = sqlx::query("SELECT id, name, min_bet, max_bet, rtp_bps, is_active, rules FROM games WHERE id = $1")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(game_from_row).transpose()
    }

    async fn list_games(&self) -> Result<Vec<GameDefinition>> {
        let rows = sqlx::query("SELECT id, name, min_bet, max_bet, rtp_bps, is_active, rules FROM games ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(game_from_row).collect()
    }

    async fn insert_game(&self, mut definition: GameDefinition) -> Result<GameDefinition> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO games (name, min_bet, max_bet, rtp_bps, is_active, rules)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&definition.name)
        .bind(definition.min_bet.as_minor())
        .bind(definition.max_bet.as_minor())
        .bind(definition.rtp_bps as i32)
        .bind(definition.is_active)
        .bind(serde_json::to_value(&definition.rules)?)
        .fetch_one(&self.pool)
        .await?;

        definition.id = id;
        Ok(definition)
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn find_account(&self, account_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn open_account(&self, account_id: &str, initial_balance: Credits) -> Result<Account> {
        let account = Account::open(account_id, initial_balance);

        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, balance, initial_balance, version, last_sequence, created_at, updated_at)
            VALUES ($1, $2, $2, 0, 0, $3, $3)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(initial_balance.as_minor())
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(AppError::AccountExists(account_id.to_string()));
        }
        Ok(account)
    }

    async fn account_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT account_id FROM accounts ORDER BY account_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt> {
        let receipt = commit.receipt();
        let now = Utc::now();
        let conflict = || AppError::ConcurrencyConflict {
            account_id: commit.account_id.clone(),
        };

        // Dropping the transaction on any early return rolls it back
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64, i64)> =
            sqlx::query_as("SELECT version, last_sequence FROM accounts WHERE account_id = $1 FOR UPDATE")
                .bind(&commit.account_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (version, last_sequence) = current.ok_or_else(|| AppError::AccountNotFound(commit.account_id.clone()))?;
        if version != commit.expected_version {
            return Err(conflict());
        }

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2, version = version + 1, last_sequence = $3, updated_at = $4
            WHERE account_id = $1 AND version = $5
            "#,
        )
        .bind(&commit.account_id)
        .bind(commit.new_balance.as_minor())
        .bind(commit.last_sequence(last_sequence))
        .bind(now)
        .bind(commit.expected_version)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(conflict());
        }

        sqlx::query("INSERT INTO ledger_commits (commit_id, account_id, receipt, created_at) VALUES ($1, $2, $3, $4)")
            .bind(commit.commit_id)
            .bind(&commit.account_id)
            .bind(serde_json::to_value(&receipt)?)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        for entry in &commit.entries {
            sqlx::query(&format!(
                "INSERT INTO ledger_entries ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                ENTRY_COLUMNS
            ))
            .bind(entry.entry_id)
            .bind(&entry.account_id)
            .bind(entry.game_id)
            .bind(entry.commit_id)
            .bind(entry.sequence)
            .bind(entry.entry_type.as_str())
            .bind(entry.amount.as_minor())
            .bind(entry.balance_before.as_minor())
            .bind(entry.balance_after.as_minor())
            .bind(&entry.description)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(result) = &commit.result {
            sqlx::query(
                r#"
                INSERT INTO game_results (
                    result_id, account_id, game_id, commit_id, hand_id,
                    stake, payout, outcome, classification, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(result.result_id)
            .bind(&result.account_id)
            .bind(result.game_id)
            .bind(result.commit_id)
            .bind(result.hand_id)
            .bind(result.stake.as_minor())
            .bind(result.payout.as_minor())
            .bind(&result.outcome)
            .bind(result.classification.as_str())
            .bind(result.created_at)
            .execute(&mut *tx)
            .await?;
        }

        match &commit.hand {
            Some(HandWrite::Open(hand)) => {
                sqlx::query(
                    r#"
                    INSERT INTO blackjack_hands (
                        hand_id, account_id, game_id, stake, round, stage, version, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(hand.hand_id)
                .bind(&hand.account_id)
                .bind(hand.game_id)
                .bind(hand.stake.as_minor())
                .bind(serde_json::to_value(&hand.round)?)
                .bind(hand.stage().as_str())
                .bind(hand.version)
                .bind(hand.created_at)
                .bind(hand.updated_at)
                .execute(&mut *tx)
                .await?;
            }
            Some(HandWrite::Update { hand, expected_version }) => {
                if !update_hand(&mut tx, hand, *expected_version).await? {
                    return Err(conflict());
                }
            }
            None => {}
        }

        tx.commit().await?;
        Ok(receipt)
    }

    async fn find_commit(&self, commit_id: Uuid) -> Result<Option<CommitReceipt>> {
        let receipt: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT receipt FROM ledger_commits WHERE commit_id = $1")
                .bind(commit_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(receipt.map(serde_json::from_value).transpose()?)
    }

    async fn entries_for_account(&self, account_id: &str, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE account_id = $1 ORDER BY sequence DESC LIMIT $2 OFFSET $3",
            ENTRY_COLUMNS
        ))
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn entry_chain(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE account_id = $1 ORDER BY sequence ASC",
            ENTRY_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn results_for_account(&self, account_id: &str) -> Result<Vec<GameResult>> {
        let rows = sqlx::query("SELECT * FROM game_results WHERE account_id = $1 ORDER BY created_at ASC")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(result_from_row).collect()
    }

    async fn find_hand(&self, hand_id: Uuid) -> Result<Option<BlackjackHand>> {
        let row = sqlx::query("SELECT * FROM blackjack_hands WHERE hand_id = $1")
            .bind(hand_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(hand_from_row).transpose()
    }

    async fn save_hand(&self, hand: &BlackjackHand, expected_version: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if !update_hand(&mut tx, hand, expected_version).await? {
            return Err(AppError::ConcurrencyConflict {
                account_id: hand.account_id.clone(),
            });
        }
        tx.commit().await?;
        Ok(())
    }

    async fn open_hands(&self) -> Result<Vec<BlackjackHand>> {
        let rows = sqlx::query("SELECT * FROM blackjack_hands WHERE stage <> 'settled' ORDER BY updated_at ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(hand_from_row).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Version-guarded hand update. False when the stored version moved.
async fn update_hand(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    hand: &BlackjackHand,
    expected_version: i64,
) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE blackjack_hands
        SET round = $2, stage = $3, version = $4, updated_at = $5
        WHERE hand_id = $1 AND version = $6
        "#,
    )
    .bind(hand.hand_id)
    .bind(serde_json::to_value(&hand.round)?)
    .bind(hand.stage().as_str())
    .bind(hand.version)
    .bind(hand.updated_at)
    .bind(expected_version)
    .execute(&mut **tx)
    .await?;

    Ok(updated.rows_affected() > 0)
}
