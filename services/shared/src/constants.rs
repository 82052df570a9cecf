/// Shared constants for the wager settlement services
///
/// This module centralizes all magic numbers and configuration defaults
/// so the engine, its stores and its tests agree on them.

/// Minor units per whole credit (two decimal places)
pub const CREDIT_SCALE: i64 = 100;

/// Basis points representing a 1x multiplier
pub const BASIS_POINTS_PER_UNIT: u32 = 10_000;

/// Balance granted to a freshly opened account (1000.00 credits)
pub const DEFAULT_STARTING_BALANCE_MINOR: i64 = 100_000;

/// Minimum count of one symbol on the slot grid that pays out
pub const DEFAULT_WIN_THRESHOLD: u8 = 3;

/// Amplifier applied when a symbol appears more often than the threshold
pub const DEFAULT_EXTRA_MATCH_AMPLIFIER: u32 = 2;

/// Amplifier applied when every cell on the grid shows the same symbol
pub const DEFAULT_FULL_MATCH_AMPLIFIER: u32 = 5;

/// Attempts made for one settlement before a lost optimistic-lock race is surfaced
pub const DEFAULT_SETTLEMENT_MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay between settlement attempts in milliseconds
pub const DEFAULT_RETRY_BACKOFF_BASE_MS: u64 = 20;

/// Maximum backoff delay between settlement attempts in milliseconds
pub const DEFAULT_RETRY_BACKOFF_MAX_MS: u64 = 500;

/// Upper bound for a single durable commit in milliseconds
pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 5_000;

/// Maximum account identifier length
///
/// Identities come from an external session layer; the cap keeps keys and
/// index rows bounded.
pub const MAX_ACCOUNT_ID_LENGTH: usize = 64;

/// Maximum ledger entry description length
pub const MAX_DESCRIPTION_LENGTH: usize = 255;

/// Default and maximum page size for ledger history listings
pub const DEFAULT_HISTORY_PAGE: i64 = 10;
pub const MAX_HISTORY_PAGE: i64 = 100;

/// Highest number of 52-card decks a blackjack shoe may hold
pub const MAX_BLACKJACK_DECKS: u8 = 8;

/// Seconds an open blackjack hand may sit without a player action before the
/// sweeper stands it
pub const DEFAULT_HAND_TTL_SECONDS: u64 = 900;

/// Seconds between abandoned-hand sweeps
pub const DEFAULT_HAND_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Accounts kept in the stats cache before the oldest are evicted
pub const DEFAULT_STATS_CACHE_CAPACITY: usize = 10_000;

/// Seconds a cached stats value is served before it is recomputed
pub const DEFAULT_STATS_CACHE_TTL_SECONDS: u64 = 300;
