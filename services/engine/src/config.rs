use anyhow::Context;
use serde::{Deserialize, Serialize};
use shared::{
    Credits, DEFAULT_COMMIT_TIMEOUT_MS, DEFAULT_RETRY_BACKOFF_BASE_MS, DEFAULT_RETRY_BACKOFF_MAX_MS,
    DEFAULT_HAND_SWEEP_INTERVAL_SECONDS, DEFAULT_HAND_TTL_SECONDS, DEFAULT_SETTLEMENT_MAX_ATTEMPTS,
    DEFAULT_STARTING_BALANCE_MINOR, DEFAULT_STATS_CACHE_CAPACITY, DEFAULT_STATS_CACHE_TTL_SECONDS,
};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::settlement::{RetryPolicy, SettlementConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Redis,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "redis" => Ok(StorageBackend::Redis),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("unknown STORAGE_BACKEND '{}' (postgres, redis or memory)", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_port: u16,
    pub metrics_port: u16,
    pub storage: StorageBackend,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub settlement: SettlementSettings,
    pub accounts: AccountConfig,
    pub stats: StatsConfig,
    pub blackjack: BlackjackConfig,
    pub seed_catalog: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementSettings {
    pub max_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,
    pub commit_timeout_ms: u64,
}

impl SettlementSettings {
    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
                backoff_max: Duration::from_millis(self.retry_backoff_max_ms),
            },
            commit_timeout: Duration::from_millis(self.commit_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub starting_balance: Credits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// 0 disables the background refresh
    pub refresh_interval_seconds: u64,
    pub cache_capacity: usize,
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlackjackConfig {
    /// Idle time after which an open hand is stood; 0 disables the sweeper
    pub hand_ttl_seconds: u64,
    pub hand_sweep_interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_port: 3001,
            metrics_port: 9090,
            storage: StorageBackend::Memory,
            database: DatabaseConfig {
                url: None,
                pool_size: 20,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            settlement: SettlementSettings {
                max_attempts: DEFAULT_SETTLEMENT_MAX_ATTEMPTS,
                retry_backoff_base_ms: DEFAULT_RETRY_BACKOFF_BASE_MS,
                retry_backoff_max_ms: DEFAULT_RETRY_BACKOFF_MAX_MS,
                commit_timeout_ms: DEFAULT_COMMIT_TIMEOUT_MS,
            },
            accounts: AccountConfig {
                starting_balance: Credits::from_minor(DEFAULT_STARTING_BALANCE_MINOR),
            },
            stats: StatsConfig {
                refresh_interval_seconds: 60,
                cache_capacity: DEFAULT_STATS_CACHE_CAPACITY,
                cache_ttl_seconds: DEFAULT_STATS_CACHE_TTL_SECONDS,
            },
            blackjack: BlackjackConfig {
                hand_ttl_seconds: DEFAULT_HAND_TTL_SECONDS,
                hand_sweep_interval_seconds: DEFAULT_HAND_SWEEP_INTERVAL_SECONDS,
            },
            seed_catalog: true,
        }
    }
}

fn var_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let config = Config {
            api_port: var_or("API_PORT", defaults.api_port)?,
            metrics_port: var_or("METRICS_PORT", defaults.metrics_port)?,
            storage: var_or("STORAGE_BACKEND", defaults.storage)?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok(),
                pool_size: var_or("DATABASE_POOL_SIZE", defaults.database.pool_size)?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or(defaults.redis.url),
            },
            settlement: SettlementSettings {
                max_attempts: var_or("SETTLEMENT_MAX_ATTEMPTS", defaults.settlement.max_attempts)?,
                retry_backoff_base_ms: var_or(
                    "SETTLEMENT_RETRY_BACKOFF_BASE_MS",
                    defaults.settlement.retry_backoff_base_ms,
                )?,
                retry_backoff_max_ms: var_or(
                    "SETTLEMENT_RETRY_BACKOFF_MAX_MS",
                    defaults.settlement.retry_backoff_max_ms,
                )?,
                commit_timeout_ms: var_or("SETTLEMENT_COMMIT_TIMEOUT_MS", defaults.settlement.commit_timeout_ms)?,
            },
            accounts: AccountConfig {
                starting_balance: var_or("STARTING_BALANCE", defaults.accounts.starting_balance)?,
            },
            stats: StatsConfig {
                refresh_interval_seconds: var_or(
                    "STATS_REFRESH_INTERVAL_SECONDS",
                    defaults.stats.refresh_interval_seconds,
                )?,
                cache_capacity: var_or("STATS_CACHE_CAPACITY", defaults.stats.cache_capacity)?,
                cache_ttl_seconds: var_or("STATS_CACHE_TTL_SECONDS", defaults.stats.cache_ttl_seconds)?,
            },
            blackjack: BlackjackConfig {
                hand_ttl_seconds: var_or("HAND_TTL_SECONDS", defaults.blackjack.hand_ttl_seconds)?,
                hand_sweep_interval_seconds: var_or(
                    "HAND_SWEEP_INTERVAL_SECONDS",
                    defaults.blackjack.hand_sweep_interval_seconds,
                )?,
            },
            seed_catalog: var_or("SEED_CATALOG", defaults.seed_catalog)?,
        };

        if config.storage == StorageBackend::Postgres && config.database.url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORAGE_BACKEND=postgres");
        }
        if config.accounts.starting_balance.is_negative() {
            anyhow::bail!("STARTING_BALANCE must not be negative");
        }
        if config.blackjack.hand_ttl_seconds > 0 && config.blackjack.hand_sweep_interval_seconds == 0 {
            anyhow::bail!("HAND_SWEEP_INTERVAL_SECONDS must be positive when HAND_TTL_SECONDS is set");
        }

        Ok(config)
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database.url.as_deref().context("DATABASE_URL must be set")
    }
}
