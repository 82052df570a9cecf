//! Per-account play statistics derived from persisted game results

use serde::{Deserialize, Serialize};
use shared::{Credits, DEFAULT_STATS_CACHE_CAPACITY, DEFAULT_STATS_CACHE_TTL_SECONDS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::GameResult;
use crate::errors::Result;
use crate::repository::LedgerStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub total_games: u64,
    pub total_win_amount: Credits,
    pub total_stake_amount: Credits,
    /// Payouts over stakes as a percentage, two decimals
    pub win_rate: f64,
}

impl PlayerStats {
    pub fn empty() -> Self {
        Self {
            total_games: 0,
            total_win_amount: Credits::ZERO,
            total_stake_amount: Credits::ZERO,
            win_rate: 0.0,
        }
    }
}

pub fn compute_stats(results: &[GameResult]) -> Result<PlayerStats> {
    let mut total_win_amount = Credits::ZERO;
    let mut total_stake_amount = Credits::ZERO;
    for result in results {
        total_win_amount = total_win_amount.checked_add(result.payout)?;
        total_stake_amount = total_stake_amount.checked_add(result.stake)?;
    }

    let win_rate = if total_stake_amount.is_positive() {
        let ratio = total_win_amount.as_minor() as f64 / total_stake_amount.as_minor() as f64;
        (ratio * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    };

    Ok(PlayerStats {
        total_games: results.len() as u64,
        total_win_amount,
        total_stake_amount,
        win_rate,
    })
}

struct CachedStats {
    /// None until computed, and again after an invalidation
    stats: Option<PlayerStats>,
    generation: u64,
    touched: Instant,
}

/// Read-through cache in front of `compute_stats`
///
/// Every invalidation gives the account a new generation. A refresh only
/// stores what it computed if the generation it started under is still
/// current, so stats read before a settlement never replace the invalidation
/// that settlement made.
pub struct StatsCache {
    store: Arc<dyn LedgerStore>,
    entries: RwLock<HashMap<String, CachedStats>>,
    generation: AtomicU64,
    capacity: usize,
    ttl: Duration,
}

impl StatsCache {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_limits(
            store,
            DEFAULT_STATS_CACHE_CAPACITY,
            Duration::from_secs(DEFAULT_STATS_CACHE_TTL_SECONDS),
        )
    }

    pub fn with_limits(store: Arc<dyn LedgerStore>, capacity: usize, ttl: Duration) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub async fn get(&self, account_id: &str) -> Result<PlayerStats> {
        if let Some(entry) = self.entries.read().await.get(account_id) {
            if let Some(stats) = &entry.stats {
                if entry.touched.elapsed() < self.ttl {
                    return Ok(stats.clone());
                }
            }
        }
        self.refresh_account(account_id).await
    }

    /// Drop a cached value so the next read recomputes it
    pub async fn invalidate(&self, account_id: &str) {
        let generation = self.next_generation();
        let mut entries = self.entries.write().await;
        entries.insert(
            account_id.to_string(),
            CachedStats {
                stats: None,
                generation,
                touched: Instant::now(),
            },
        );
        self.evict_oldest(&mut entries);
    }

    pub async fn cached_accounts(&self) -> usize {
        self.entries.read().await.len()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn evict_oldest(&self, entries: &mut HashMap<String, CachedStats>) {
        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(account_id, _)| account_id.clone());
            match oldest {
                Some(account_id) => entries.remove(&account_id),
                None => break,
            };
        }
    }

    /// Generation a refresh of `account_id` runs under
    async fn begin_refresh(&self, account_id: &str) -> u64 {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(account_id) {
            return entry.generation;
        }
        let generation = self.next_generation();
        entries.insert(
            account_id.to_string(),
            CachedStats {
                stats: None,
                generation,
                touched: Instant::now(),
            },
        );
        self.evict_oldest(&mut entries);
        generation
    }

    /// Store computed stats unless the account was invalidated or evicted since
    /// `generation` was taken. Returns whether the value was kept.
    async fn finish_refresh(&self, account_id: &str, generation: u64, stats: &PlayerStats) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(account_id) {
            Some(entry) if entry.generation == generation => {
                entry.stats = Some(stats.clone());
                entry.touched = Instant::now();
                true
            }
            _ => false,
        }
    }

    async fn refresh_account(&self, account_id: &str) -> Result<PlayerStats> {
        let generation = self.begin_refresh(account_id).await;
        let results = self.store.results_for_account(account_id).await?;
        let stats = compute_stats(&results)?;
        if !self.finish_refresh(account_id, generation, &stats).await {
            tracing::debug!(account_id = %account_id, "Stats changed during refresh, not cached");
        }
        Ok(stats)
    }

    /// Recompute every account holding a cached value
    pub async fn refresh_all(&self) -> usize {
        let accounts: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.stats.is_some())
            .map(|(account_id, _)| account_id.clone())
            .collect();
        let mut refreshed = 0;
        for account_id in accounts {
            match self.refresh_account(&account_id).await {
                Ok(_) => refreshed += 1,
                Err(e) => tracing::warn!(account_id = %account_id, error = %e, "Stats refresh failed"),
            }
        }
        refreshed
    }

    pub fn spawn_refresh(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Stats refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let refreshed = self.refresh_all().await;
                        tracing::debug!(refreshed, "Stats cache refreshed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResultClass;
    use crate::ledger::{AccountLedger, LedgerEntryDraft};
    use crate::repository::InMemoryStore;
    use chrono::Utc;
    use uuid::Uuid;

    fn result(stake: i64, payout: i64) -> GameResult {
        GameResult {
            result_id: Uuid::new_v4(),
            account_id: "a".to_string(),
            game_id: 1,
            commit_id: Uuid::new_v4(),
            hand_id: None,
            stake: Credits::from_minor(stake),
            payout: Credits::from_minor(payout),
            outcome: serde_json::json!({}),
            classification: if payout > 0 { ResultClass::Win } else { ResultClass::Loss },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_win_rate_is_payout_over_stake() {
        let mut results: Vec<_> = (0..10).map(|_| result(1000, 0)).collect();
        results[0].payout = Credits::from_minor(4000);

        let stats = compute_stats(&results).unwrap();
        assert_eq!(stats.total_games, 10);
        assert_eq!(stats.total_stake_amount.as_minor(), 10_000);
        assert_eq!(stats.total_win_amount.as_minor(), 4000);
        assert_eq!(stats.win_rate, 40.0);
    }

    #[test]
    fn test_no_stakes_means_zero_rate() {
        assert_eq!(compute_stats(&[]).unwrap(), PlayerStats::empty());
    }

    #[test]
    fn test_win_rate_rounds_to_two_decimals() {
        let stats = compute_stats(&[result(300, 100)]).unwrap();
        assert_eq!(stats.win_rate, 33.33);
    }

    #[tokio::test]
    async fn test_cache_reads_through_and_invalidates() {
        let store = Arc::new(InMemoryStore::new());
        store.open_account("a", Credits::from_minor(10_000)).await.unwrap();
        let cache = StatsCache::new(store.clone());
        assert_eq!(cache.get("a").await.unwrap().total_games, 0);

        let ledger = AccountLedger::new(store.clone());
        let account = ledger.load("a").await.unwrap();
        let drafts = [LedgerEntryDraft::bet(1, Credits::from_minor(500), "spin").unwrap()];
        let commit = ledger.stage(&account, &drafts).unwrap();
        let mut stored = result(500, 0);
        stored.commit_id = commit.commit_id;
        store.commit(commit.with_result(stored)).await.unwrap();

        // Cached value stays until invalidated
        assert_eq!(cache.get("a").await.unwrap().total_games, 0);
        cache.invalidate("a").await;
        assert_eq!(cache.get("a").await.unwrap().total_games, 1);
    }

    async fn settle_one(store: &Arc<InMemoryStore>, account_id: &str) {
        let ledger = AccountLedger::new(store.clone());
        let account = ledger.load(account_id).await.unwrap();
        let drafts = [LedgerEntryDraft::bet(1, Credits::from_minor(500), "spin").unwrap()];
        let commit = ledger.stage(&account, &drafts).unwrap();
        let mut stored = result(500, 0);
        stored.account_id = account_id.to_string();
        stored.commit_id = commit.commit_id;
        store.commit(commit.with_result(stored)).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_started_before_invalidation_is_not_cached() {
        let store = Arc::new(InMemoryStore::new());
        store.open_account("a", Credits::from_minor(10_000)).await.unwrap();
        let cache = StatsCache::new(store.clone());

        // A refresh reads results, then a settlement lands and invalidates
        let generation = cache.begin_refresh("a").await;
        let stale = compute_stats(&store.results_for_account("a").await.unwrap()).unwrap();
        settle_one(&store, "a").await;
        cache.invalidate("a").await;

        assert!(!cache.finish_refresh("a", generation, &stale).await);
        assert_eq!(cache.get("a").await.unwrap().total_games, 1);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let store = Arc::new(InMemoryStore::new());
        let cache = StatsCache::with_limits(store.clone(), 2, Duration::from_secs(60));
        for account_id in ["a", "b", "c", "d"] {
            store.open_account(account_id, Credits::from_minor(1000)).await.unwrap();
            cache.get(account_id).await.unwrap();
        }
        assert_eq!(cache.cached_accounts().await, 2);

        for account_id in ["e", "f", "g"] {
            cache.invalidate(account_id).await;
        }
        assert_eq!(cache.cached_accounts().await, 2);
    }

    #[tokio::test]
    async fn test_expired_value_is_recomputed() {
        let store = Arc::new(InMemoryStore::new());
        store.open_account("a", Credits::from_minor(10_000)).await.unwrap();
        let cache = StatsCache::with_limits(store.clone(), 16, Duration::ZERO);
        assert_eq!(cache.get("a").await.unwrap().total_games, 0);

        settle_one(&store, "a").await;
        assert_eq!(cache.get("a").await.unwrap().total_games, 1);
    }

    #[tokio::test]
    async fn test_refresh_task_stops_on_cancel() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(StatsCache::new(store));
        let shutdown = CancellationToken::new();
        let handle = cache.spawn_refresh(Duration::from_millis(5), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
