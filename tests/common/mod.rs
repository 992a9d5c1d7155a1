use comicstand_api::{
    config::{AppConfig, PesapalConfig},
    db,
    entities::product::{self, ProductKind},
    events,
    handlers::AppServices,
    services::catalog::CreateProductInput,
    AppState,
};
use axum::Router;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness: a fresh SQLite database (unique file per test), the
/// embedded migrator, full service wiring and the real router.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    db_path: PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let db_path =
            std::env::temp_dir().join(format!("comicstand_test_{}.db", Uuid::new_v4().simple()));

        let mut cfg = AppConfig {
            database_url: format!("sqlite://{}?mode=rwc", db_path.display()),
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            log_json: false,
            auto_migrate: true,
            site_url: "http://localhost:8080".to_string(),
            cors_allowed_origins: None,
            db_max_connections: 5,
            db_min_connections: 1,
            db_connect_timeout_secs: 5,
            pesapal: PesapalConfig::default(),
            smtp: None,
        };
        customize(&mut cfg);

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = events::EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);

        let state = Arc::new(AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        });
        let router = comicstand_api::app_router(state.clone());

        Self {
            state,
            router,
            db_path,
            _event_task: event_task,
        }
    }

    /// Seed a plain (non-event) product.
    #[allow(dead_code)]
    pub async fn seed_product(&self, title: &str, price: Decimal, stock: i32) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                title: title.to_string(),
                description: String::new(),
                price,
                discounted_price: None,
                cost: None,
                stock,
                trending: false,
                kind: ProductKind::Standard,
                event_start: None,
                event_end: None,
                event_location: None,
            })
            .await
            .expect("failed to seed product")
    }

    /// Seed a ticketed event product.
    #[allow(dead_code)]
    pub async fn seed_event(&self, title: &str, price: Decimal, stock: i32) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                title: title.to_string(),
                description: String::new(),
                price,
                discounted_price: None,
                cost: None,
                stock,
                trending: false,
                kind: ProductKind::Event,
                event_start: Some(Utc::now() + Duration::days(7)),
                event_end: None,
                event_location: Some("The Vault".to_string()),
            })
            .await
            .expect("failed to seed event product")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}
