//! Redis key generation functions
//!
//! Centralizes all Redis key patterns used for ledger storage and indexing.

use uuid::Uuid;

/// Redis key prefix for account hashes
const ACCOUNT_KEY_PREFIX: &str = "account:";

/// Redis key prefix for an account's entry list, oldest first
const LEDGER_KEY_PREFIX: &str = "ledger:";

/// Redis key prefix for an account's game result list
const RESULTS_KEY_PREFIX: &str = "results:";

/// Redis key prefix for blackjack hand hashes
const HAND_KEY_PREFIX: &str = "hand:";

/// Redis key prefix for commit receipts
const COMMIT_KEY_PREFIX: &str = "commit:";

/// Sorted set of account ids scored by open time
const ACCOUNT_INDEX: &str = "accounts";

/// Sorted set of open hand ids scored by last activity
const OPEN_HANDS_INDEX: &str = "hands:open";

/// Hash of game id to definition JSON
const GAMES: &str = "games";

/// Counter for game ids
const GAME_ID_SEQUENCE: &str = "games:next_id";

pub fn account_key(account_id: &str) -> String {
    format!("{}{}", ACCOUNT_KEY_PREFIX, account_id)
}

pub fn ledger_key(account_id: &str) -> String {
    format!("{}{}", LEDGER_KEY_PREFIX, account_id)
}

pub fn results_key(account_id: &str) -> String {
    format!("{}{}", RESULTS_KEY_PREFIX, account_id)
}

pub fn hand_key(hand_id: Uuid) -> String {
    format!("{}{}", HAND_KEY_PREFIX, hand_id)
}

pub fn commit_key(commit_id: Uuid) -> String {
    format!("{}{}", COMMIT_KEY_PREFIX, commit_id)
}

pub fn account_index_key() -> &'static str {
    ACCOUNT_INDEX
}

pub fn open_hands_index_key() -> &'static str {
    OPEN_HANDS_INDEX
}

pub fn games_key() -> &'static str {
    GAMES
}

pub fn game_id_sequence_key() -> &'static str {
    GAME_ID_SEQUENCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_scoped_keys() {
        assert_eq!(account_key("player-1"), "account:player-1");
        assert_eq!(ledger_key("player-1"), "ledger:player-1");
        assert_eq!(results_key("player-1"), "results:player-1");
    }

    #[test]
    fn test_id_keys() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(hand_key(id), "hand:550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(commit_key(id), "commit:550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_index_keys_are_constants() {
        assert_eq!(account_index_key(), "accounts");
        assert_eq!(games_key(), "games");
        assert_eq!(game_id_sequence_key(), "games:next_id");
        assert_eq!(open_hands_index_key(), "hands:open");
    }
}
