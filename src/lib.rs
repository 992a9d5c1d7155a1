//! comicstand-api library
//!
//! Backend for a comics storefront: catalog, actor-scoped carts, Pesapal
//! hosted checkout, single-use event tickets and traffic counters.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// All v1 API routes, nested under `/api/v1`.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/products", handlers::products::routes())
        .nest("/cart", handlers::carts::routes())
        .nest("/orders", handlers::orders::routes())
        .nest("/payments", handlers::payments::routes())
        .nest("/events", handlers::tickets::routes())
        .nest("/analytics", handlers::analytics::routes())
}

/// The full application router. Shared by `main` and the test harness so
/// both exercise identical routing.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "comicstand-api up" }))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .with_state(state)
}
