use crate::{errors::ServiceError, handlers::common::success_response, AppState};
use axum::{extract::State, response::IntoResponse, routing::{get, post}, Router};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/visit", post(record_visit))
        .route("/visitors", get(visitor_counts))
        .route("/stats", get(sales_stats))
}

pub async fn record_visit(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.analytics.record_visit().await?;
    Ok(success_response(serde_json::json!({ "recorded": true })))
}

pub async fn visitor_counts(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let counts = state.services.analytics.visitor_counts().await?;
    Ok(success_response(counts))
}

pub async fn sales_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.services.analytics.sales_stats().await?;
    Ok(success_response(stats))
}
