use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn detailed_health(State(state): State<AppState>) -> Json<Value> {
    let store_healthy = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            false
        }
    };
    let catalog_healthy = state.catalog.list_games().await.is_ok();

    Json(json!({
        "status": if store_healthy && catalog_healthy { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "components": {
            "storage": {
                "backend": state.config.storage,
                "status": if store_healthy { "healthy" } else { "unhealthy" },
            },
            "catalog": if catalog_healthy { "healthy" } else { "unhealthy" },
        }
    }))
}
