use async_trait::async_trait;
use chrono::Utc;
use shared::Credits;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{CommitReceipt, GameCatalog, HandWrite, LedgerCommit, LedgerStore};
use crate::domain::{Account, BlackjackHand, GameDefinition, GameId, GameResult, LedgerEntry};
use crate::errors::{AppError, Result};

#[derive(Default)]
struct State {
    games: BTreeMap<GameId, GameDefinition>,
    accounts: BTreeMap<String, Account>,
    entries: HashMap<String, Vec<LedgerEntry>>,
    results: HashMap<String, Vec<GameResult>>,
    hands: HashMap<Uuid, BlackjackHand>,
    commits: HashMap<Uuid, CommitReceipt>,
}

/// Injected failures for exercising rollback and timeout paths
#[derive(Debug, Default, Clone)]
pub struct FaultPlan {
    /// Reject this many commits outright
    pub fail_commits: usize,
    /// Answer this many commits with a version conflict, as if another writer won
    pub conflict_commits: usize,
    /// Reject this many commits at the result write, after entries were staged
    pub fail_result_writes: usize,
    /// Sleep before applying each commit
    pub delay_before_commit: Option<Duration>,
    /// Sleep after a commit landed, before returning
    pub delay_after_commit: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
enum FaultStep {
    Commit,
    Conflict,
    ResultWrite,
}

/// Process-local store for tests and the `memory` backend
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    faults: Mutex<FaultPlan>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn inject_faults(&self, plan: FaultPlan) {
        *self.faults.lock().await = plan;
    }

    /// Returns true when the next commit should fail at the given step
    async fn take_fault(&self, step: FaultStep) -> bool {
        let mut faults = self.faults.lock().await;
        let counter = match step {
            FaultStep::Commit => &mut faults.fail_commits,
            FaultStep::Conflict => &mut faults.conflict_commits,
            FaultStep::ResultWrite => &mut faults.fail_result_writes,
        };
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }

    async fn delays(&self) -> (Option<Duration>, Option<Duration>) {
        let faults = self.faults.lock().await;
        (faults.delay_before_commit, faults.delay_after_commit)
    }

    fn check_hand(state: &State, write: &HandWrite) -> Result<()> {
        match write {
            HandWrite::Open(hand) if state.hands.contains_key(&hand.hand_id) => Err(AppError::Internal(
                anyhow::anyhow!("hand {} already exists", hand.hand_id),
            )),
            HandWrite::Open(_) => Ok(()),
            HandWrite::Update { hand, expected_version } => match state.hands.get(&hand.hand_id) {
                None => Err(AppError::HandNotFound(hand.hand_id)),
                Some(stored) if stored.version != *expected_version => Err(AppError::ConcurrencyConflict {
                    account_id: hand.account_id.clone(),
                }),
                Some(_) => Ok(()),
            },
        }
    }
}

#[async_trait]
impl GameCatalog for InMemoryStore {
    async fn find_game(&self, game_id: GameId) -> Result<Option<GameDefinition>> {
        Ok(self.state.read().await.games.get(&game_id).cloned())
    }

    async fn list_games(&self) -> Result<Vec<GameDefinition>> {
        Ok(self.state.read().await.games.values().cloned().collect())
    }

    async fn insert_game(&self, mut definition: GameDefinition) -> Result<GameDefinition> {
        let mut state = self.state.write().await;
        definition.id = state.games.keys().next_back().map_or(1, |id| id + 1);
        state.games.insert(definition.id, definition.clone());
        Ok(definition)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn find_account(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.state.read().await.accounts.get(account_id).cloned())
    }

    async fn open_account(&self, account_id: &str, initial_balance: Credits) -> Result<Account> {
        let mut state = self.state.write().await;
        if state.accounts.contains_key(account_id) {
            return Err(AppError::AccountExists(account_id.to_string()));
        }
        let account = Account::open(account_id, initial_balance);
        state.accounts.insert(account_id.to_string(), account.clone());
        Ok(account)
    }

    async fn account_ids(&self) -> Result<Vec<String>> {
        Ok(self.state.read().await.accounts.keys().cloned().collect())
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt> {
        let (before, after) = self.delays().await;
        if let Some(delay) = before {
            tokio::time::sleep(delay).await;
        }
        if self.take_fault(FaultStep::Commit).await {
            return Err(AppError::PersistenceFailure("injected commit failure".to_string()));
        }
        if self.take_fault(FaultStep::Conflict).await {
            return Err(AppError::ConcurrencyConflict {
                account_id: commit.account_id.clone(),
            });
        }

        let receipt = {
            let mut state = self.state.write().await;

            let account = state
                .accounts
                .get(&commit.account_id)
                .ok_or_else(|| AppError::AccountNotFound(commit.account_id.clone()))?;
            if account.version != commit.expected_version {
                return Err(AppError::ConcurrencyConflict {
                    account_id: commit.account_id.clone(),
                });
            }
            if let Some(write) = &commit.hand {
                Self::check_hand(&state, write)?;
            }
            if commit.result.is_some() && self.take_fault(FaultStep::ResultWrite).await {
                return Err(AppError::PersistenceFailure("injected result write failure".to_string()));
            }

            let receipt = commit.receipt();
            let now = Utc::now();

            let mut updated = account.clone();
            updated.balance = commit.new_balance;
            updated.version = receipt.new_version;
            updated.last_sequence = commit.last_sequence(updated.last_sequence);
            updated.updated_at = now;
            state.accounts.insert(commit.account_id.clone(), updated);

            state
                .entries
                .entry(commit.account_id.clone())
                .or_default()
                .extend(commit.entries);
            if let Some(result) = commit.result {
                state.results.entry(commit.account_id.clone()).or_default().push(result);
            }
            if let Some(write) = commit.hand {
                let hand = match write {
                    HandWrite::Open(hand) => hand,
                    HandWrite::Update { hand, .. } => hand,
                };
                state.hands.insert(hand.hand_id, hand);
            }
            state.commits.insert(receipt.commit_id, receipt.clone());
            receipt
        };

        if let Some(delay) = after {
            tokio::time::sleep(delay).await;
        }
        Ok(receipt)
    }

    async fn find_commit(&self, commit_id: Uuid) -> Result<Option<CommitReceipt>> {
        Ok(self.state.read().await.commits.get(&commit_id).cloned())
    }

    async fn entries_for_account(&self, account_id: &str, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        let entries = state.entries.get(account_id).map(Vec::as_slice).unwrap_or_default();
        Ok(entries
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn entry_chain(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn results_for_account(&self, account_id: &str) -> Result<Vec<GameResult>> {
        Ok(self
            .state
            .read()
            .await
            .results
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_hand(&self, hand_id: Uuid) -> Result<Option<BlackjackHand>> {
        Ok(self.state.read().await.hands.get(&hand_id).cloned())
    }

    async fn save_hand(&self, hand: &BlackjackHand, expected_version: i64) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check_hand(
            &state,
            &HandWrite::Update {
                hand: hand.clone(),
                expected_version,
            },
        )?;
        state.hands.insert(hand.hand_id, hand.clone());
        Ok(())
    }

    async fn open_hands(&self) -> Result<Vec<BlackjackHand>> {
        let mut hands: Vec<BlackjackHand> = self
            .state
            .read()
            .await
            .hands
            .values()
            .filter(|hand| hand.is_open())
            .cloned()
            .collect();
        hands.sort_by_key(|hand| hand.updated_at);
        Ok(hands)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
