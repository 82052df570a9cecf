use axum::response::IntoResponse;

pub async fn metrics_handler() -> impl IntoResponse {
    // Prometheus exposition lives on the metrics port
    "Metrics available on metrics port"
}
