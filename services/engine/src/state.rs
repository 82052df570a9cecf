use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::repository::{GameCatalog, LedgerStore};
use crate::settlement::{RandomSource, SettlementCoordinator};
use crate::stats::StatsCache;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn GameCatalog>,
    pub store: Arc<dyn LedgerStore>,
    pub coordinator: Arc<SettlementCoordinator>,
    pub stats: Arc<StatsCache>,
}

impl AppState {
    pub fn new(
        config: Config,
        catalog: Arc<dyn GameCatalog>,
        store: Arc<dyn LedgerStore>,
        rng_source: Arc<dyn RandomSource>,
    ) -> Self {
        let coordinator = SettlementCoordinator::new(
            catalog.clone(),
            store.clone(),
            rng_source,
            config.settlement.settlement_config(),
        );
        let stats = StatsCache::with_limits(
            store.clone(),
            config.stats.cache_capacity,
            Duration::from_secs(config.stats.cache_ttl_seconds),
        );
        Self {
            config: Arc::new(config),
            catalog,
            stats: Arc::new(stats),
            store,
            coordinator: Arc::new(coordinator),
        }
    }
}
