use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::Credits;
use std::fmt;
use uuid::Uuid;

use crate::catalog::GameRules;
use crate::outcome::blackjack::{BlackjackRound, RoundStage};

pub type GameId = i64;

/// Player account as held by the ledger
///
/// `version` increases by one with every committed unit of work and is the
/// optimistic-lock guard for the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub balance: Credits,
    pub initial_balance: Credits,
    pub version: i64,
    /// Sequence number of the newest ledger entry, 0 before the first
    pub last_sequence: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn open(account_id: &str, initial_balance: Credits) -> Self {
        let now = Utc::now();
        Self {
            account_id: account_id.to_string(),
            balance: initial_balance,
            initial_balance,
            version: 0,
            last_sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Slots,
    Blackjack,
    Roulette,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Slots => "slots",
            GameKind::Blackjack => "blackjack",
            GameKind::Roulette => "roulette",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry describing one playable game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDefinition {
    pub id: GameId,
    pub name: String,
    pub min_bet: Credits,
    pub max_bet: Credits,
    /// Target return to player, basis points of the stake
    pub rtp_bps: u32,
    pub is_active: bool,
    pub rules: GameRules,
}

impl GameDefinition {
    pub fn kind(&self) -> GameKind {
        self.rules.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Bet,
    Win,
    Deposit,
    Withdrawal,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Bet => "bet",
            EntryType::Win => "win",
            EntryType::Deposit => "deposit",
            EntryType::Withdrawal => "withdrawal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bet" => Some(EntryType::Bet),
            "win" => Some(EntryType::Win),
            "deposit" => Some(EntryType::Deposit),
            "withdrawal" => Some(EntryType::Withdrawal),
            _ => None,
        }
    }

    /// Bets and withdrawals take money out of the account
    pub fn is_debit(&self) -> bool {
        matches!(self, EntryType::Bet | EntryType::Withdrawal)
    }
}

/// Immutable record of one balance-affecting event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub account_id: String,
    pub game_id: Option<GameId>,
    /// Unit of work that wrote this entry
    pub commit_id: Uuid,
    /// Position in the account's history, starting at 1
    pub sequence: i64,
    pub entry_type: EntryType,
    pub amount: Credits,
    pub balance_before: Credits,
    pub balance_after: Credits,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultClass {
    Win,
    Loss,
    Push,
}

impl ResultClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultClass::Win => "win",
            ResultClass::Loss => "loss",
            ResultClass::Push => "push",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "win" => Some(ResultClass::Win),
            "loss" => Some(ResultClass::Loss),
            "push" => Some(ResultClass::Push),
            _ => None,
        }
    }
}

/// One settled wager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub result_id: Uuid,
    pub account_id: String,
    pub game_id: GameId,
    pub commit_id: Uuid,
    pub hand_id: Option<Uuid>,
    pub stake: Credits,
    pub payout: Credits,
    /// Reels, cards and multipliers, shaped by game type
    pub outcome: serde_json::Value,
    pub classification: ResultClass,
    pub created_at: DateTime<Utc>,
}

/// Blackjack hand between the deal and its settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackjackHand {
    pub hand_id: Uuid,
    pub account_id: String,
    pub game_id: GameId,
    pub stake: Credits,
    pub round: BlackjackRound,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlackjackHand {
    pub fn stage(&self) -> RoundStage {
        self.round.stage
    }

    pub fn is_open(&self) -> bool {
        self.round.stage != RoundStage::Settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_round_trip() {
        for entry_type in [EntryType::Bet, EntryType::Win, EntryType::Deposit, EntryType::Withdrawal] {
            assert_eq!(EntryType::parse(entry_type.as_str()), Some(entry_type));
        }
        assert_eq!(EntryType::parse("refund"), None);
    }

    #[test]
    fn test_debit_entry_types() {
        assert!(EntryType::Bet.is_debit());
        assert!(EntryType::Withdrawal.is_debit());
        assert!(!EntryType::Win.is_debit());
        assert!(!EntryType::Deposit.is_debit());
    }

    #[test]
    fn test_result_class_parse() {
        assert_eq!(ResultClass::parse("push"), Some(ResultClass::Push));
        assert_eq!(ResultClass::parse(""), None);
    }
}
