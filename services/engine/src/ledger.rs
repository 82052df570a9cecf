//! Account ledger
//!
//! All balance mutation goes through here: drafts are chained against the
//! account as read, then committed with the read version as the optimistic
//! lock. A stale read surfaces as `ConcurrencyConflict` from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Credits, MAX_DESCRIPTION_LENGTH};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Account, EntryType, GameId, LedgerEntry};
use crate::errors::{AppError, Result};
use crate::repository::{LedgerCommit, LedgerStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntryDraft {
    pub entry_type: EntryType,
    /// Signed: negative for bets and withdrawals
    pub amount: Credits,
    pub game_id: Option<GameId>,
    pub description: String,
}

impl LedgerEntryDraft {
    pub fn bet(game_id: GameId, stake: Credits, description: impl Into<String>) -> Result<Self> {
        Ok(Self {
            entry_type: EntryType::Bet,
            amount: stake.checked_neg()?,
            game_id: Some(game_id),
            description: description.into(),
        })
    }

    pub fn win(game_id: GameId, payout: Credits, description: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Win,
            amount: payout,
            game_id: Some(game_id),
            description: description.into(),
        }
    }

    pub fn deposit(amount: Credits, description: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Deposit,
            amount,
            game_id: None,
            description: description.into(),
        }
    }

    pub fn withdrawal(amount: Credits, description: impl Into<String>) -> Result<Self> {
        Ok(Self {
            entry_type: EntryType::Withdrawal,
            amount: amount.checked_neg()?,
            game_id: None,
            description: description.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEntries {
    pub new_balance: Credits,
    pub entries: Vec<LedgerEntry>,
}

fn clip_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_LENGTH).collect()
}

/// Chain drafts onto the account's current balance.
///
/// Fails without side effects if any intermediate balance would go negative.
pub fn chain_entries(
    account: &Account,
    commit_id: Uuid,
    drafts: &[LedgerEntryDraft],
    now: DateTime<Utc>,
) -> Result<AppliedEntries> {
    let mut balance = account.balance;
    let mut sequence = account.last_sequence;
    let mut entries = Vec::with_capacity(drafts.len());

    for draft in drafts {
        if draft.amount == Credits::ZERO || draft.entry_type.is_debit() != draft.amount.is_negative() {
            return Err(AppError::InvalidInput(format!(
                "{} entry with amount {}",
                draft.entry_type.as_str(),
                draft.amount
            )));
        }

        let balance_after = balance.checked_add(draft.amount)?;
        if balance_after.is_negative() {
            return Err(AppError::InsufficientFunds {
                required: draft.amount.checked_neg()?,
                available: balance,
            });
        }

        sequence += 1;
        entries.push(LedgerEntry {
            entry_id: Uuid::new_v4(),
            account_id: account.account_id.clone(),
            game_id: draft.game_id,
            commit_id,
            sequence,
            entry_type: draft.entry_type,
            amount: draft.amount,
            balance_before: balance,
            balance_after,
            description: clip_description(&draft.description),
            created_at: now,
        });
        balance = balance_after;
    }

    Ok(AppliedEntries {
        new_balance: balance,
        entries,
    })
}

pub struct AccountLedger {
    store: Arc<dyn LedgerStore>,
}

impl AccountLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, account_id: &str) -> Result<Account> {
        self.store
            .find_account(account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
    }

    /// Build a commit for `drafts` guarded by the account version just read
    pub fn stage(&self, account: &Account, drafts: &[LedgerEntryDraft]) -> Result<LedgerCommit> {
        let commit_id = Uuid::new_v4();
        let applied = chain_entries(account, commit_id, drafts, Utc::now())?;
        Ok(LedgerCommit::new(commit_id, account, applied))
    }

    pub async fn apply_entries(&self, account_id: &str, drafts: &[LedgerEntryDraft]) -> Result<AppliedEntries> {
        let account = self.load(account_id).await?;
        let commit = self.stage(&account, drafts)?;
        let receipt = self.store.commit(commit).await?;

        tracing::debug!(
            account_id = %account_id,
            commit_id = %receipt.commit_id,
            new_balance = %receipt.new_balance,
            "Ledger entries applied"
        );

        Ok(AppliedEntries {
            new_balance: receipt.new_balance,
            entries: receipt.entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: i64) -> Account {
        let mut account = Account::open("player-1", Credits::from_minor(balance));
        account.last_sequence = 4;
        account
    }

    #[test]
    fn test_entries_chain_exactly() {
        let drafts = vec![
            LedgerEntryDraft::bet(1, Credits::from_minor(500), "Slot spin - Lucky Sevens").unwrap(),
            LedgerEntryDraft::win(1, Credits::from_minor(2500), "Slot win - Lucky Sevens"),
        ];
        let applied = chain_entries(&account(1000), Uuid::new_v4(), &drafts, Utc::now()).unwrap();

        assert_eq!(applied.new_balance.as_minor(), 3000);
        let [bet, win] = applied.entries.as_slice() else {
            panic!("expected two entries");
        };
        assert_eq!(bet.balance_before.as_minor(), 1000);
        assert_eq!(bet.balance_after.as_minor(), 500);
        assert_eq!(win.balance_before, bet.balance_after);
        assert_eq!(win.balance_after.as_minor(), 3000);
        assert_eq!((bet.sequence, win.sequence), (5, 6));
        assert_eq!(bet.commit_id, win.commit_id);
    }

    #[test]
    fn test_insufficient_funds_checked_per_step() {
        // the win would cover it, but the bet alone overdraws
        let drafts = vec![
            LedgerEntryDraft::bet(1, Credits::from_minor(1500), "bet").unwrap(),
            LedgerEntryDraft::win(1, Credits::from_minor(5000), "win"),
        ];
        match chain_entries(&account(1000), Uuid::new_v4(), &drafts, Utc::now()) {
            Err(AppError::InsufficientFunds { required, available }) => {
                assert_eq!(required.as_minor(), 1500);
                assert_eq!(available.as_minor(), 1000);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_exact_balance_can_be_staked() {
        let drafts = vec![LedgerEntryDraft::bet(1, Credits::from_minor(1000), "bet").unwrap()];
        let applied = chain_entries(&account(1000), Uuid::new_v4(), &drafts, Utc::now()).unwrap();
        assert_eq!(applied.new_balance, Credits::ZERO);
    }

    #[test]
    fn test_sign_must_match_entry_type() {
        let wrong = LedgerEntryDraft {
            entry_type: EntryType::Win,
            amount: Credits::from_minor(-10),
            game_id: Some(1),
            description: "win".into(),
        };
        assert!(matches!(
            chain_entries(&account(1000), Uuid::new_v4(), &[wrong], Utc::now()),
            Err(AppError::InvalidInput(_))
        ));

        let zero = LedgerEntryDraft::deposit(Credits::ZERO, "nothing");
        assert!(chain_entries(&account(1000), Uuid::new_v4(), &[zero], Utc::now()).is_err());
    }

    #[test]
    fn test_long_descriptions_are_clipped() {
        let drafts = vec![LedgerEntryDraft::deposit(Credits::from_minor(1), "x".repeat(400))];
        let applied = chain_entries(&account(0), Uuid::new_v4(), &drafts, Utc::now()).unwrap();
        assert_eq!(applied.entries[0].description.len(), MAX_DESCRIPTION_LENGTH);
    }
}
