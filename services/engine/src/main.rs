use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use engine::config::{Config, StorageBackend};
use engine::reconciliation::reconcile_accounts;
use engine::repository::{seed_catalog, GameCatalog, InMemoryStore, LedgerStore, PostgresStore, RedisStore};
use engine::settlement::EntropySource;
use engine::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with JSON formatting (configurable via env)
    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "engine=info,tower_http=info".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        service = "engine",
        version = env!("CARGO_PKG_VERSION"),
        log_format = if use_json { "json" } else { "text" },
        "Starting wager settlement engine"
    );

    let config = Config::load()?;
    tracing::info!(backend = ?config.storage, "Configuration loaded");

    let (catalog, store) = open_storage(&config).await?;

    if config.seed_catalog {
        let seeded = seed_catalog(catalog.as_ref()).await?;
        if seeded > 0 {
            tracing::info!(seeded, "Game catalog seeded");
        }
    }

    let report = reconcile_accounts(store.as_ref()).await?;
    if report.violations > 0 {
        tracing::error!(
            accounts = report.accounts_with_violations,
            violations = report.violations,
            "Ledger chain violations found at startup"
        );
    }

    let app_state = AppState::new(config.clone(), catalog, store, Arc::new(EntropySource));

    let hand_ttl = Duration::from_secs(config.blackjack.hand_ttl_seconds);
    if !hand_ttl.is_zero() {
        let settled = app_state.coordinator.settle_abandoned_hands(hand_ttl).await?;
        if settled > 0 {
            tracing::info!(settled, "Abandoned blackjack hands settled at startup");
        }
    }

    let shutdown = CancellationToken::new();
    let stats_task = (config.stats.refresh_interval_seconds > 0).then(|| {
        app_state.stats.clone().spawn_refresh(
            Duration::from_secs(config.stats.refresh_interval_seconds),
            shutdown.clone(),
        )
    });

    let sweeper_task = (!hand_ttl.is_zero()).then(|| {
        app_state.coordinator.clone().spawn_hand_sweeper(
            hand_ttl,
            Duration::from_secs(config.blackjack.hand_sweep_interval_seconds),
            shutdown.clone(),
        )
    });

    let app = engine::build_router(app_state);

    // Start metrics server
    let metrics_handle = tokio::spawn(start_metrics_server(config.metrics_port));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("Engine API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    for task in [stats_task, sweeper_task].into_iter().flatten() {
        task.await?;
    }
    metrics_handle.abort();

    Ok(())
}

type Storage = (Arc<dyn GameCatalog>, Arc<dyn LedgerStore>);

fn shared_storage<S: GameCatalog + LedgerStore + 'static>(store: Arc<S>) -> Storage {
    let catalog: Arc<dyn GameCatalog> = store.clone();
    let ledger: Arc<dyn LedgerStore> = store;
    (catalog, ledger)
}

async fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    match config.storage {
        StorageBackend::Postgres => {
            let store = Arc::new(
                PostgresStore::connect(
                    config.database_url()?,
                    config.database.pool_size,
                    Duration::from_millis(config.settlement.commit_timeout_ms),
                )
                .await?,
            );
            store.migrate().await?;
            tracing::info!("PostgreSQL connected and migrated");
            Ok(shared_storage(store))
        }
        StorageBackend::Redis => {
            let store = Arc::new(RedisStore::connect(&config.redis.url).await?);
            tracing::info!("Redis connected");
            Ok(shared_storage(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; balances are lost on restart");
            let store = Arc::new(InMemoryStore::new());
            Ok(shared_storage(store))
        }
    }
}

async fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    let app = Router::new().route("/metrics", get(|| async move { handle.render() }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
