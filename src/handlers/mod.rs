use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        analytics::AnalyticsService, carts::CartService, catalog::CatalogService,
        notifications::TicketMailer, orders::OrderService, payments::PesapalGateway,
        tickets::TicketService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{info, warn};

pub mod analytics;
pub mod carts;
pub mod common;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod tickets;

/// Service singletons shared by every HTTP handler.
#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<CartService>,
    pub catalog: Arc<CatalogService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PesapalGateway>,
    pub tickets: Arc<TicketService>,
    pub analytics: Arc<AnalyticsService>,
    pub mailer: Option<Arc<TicketMailer>>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        let mailer = match &config.smtp {
            Some(smtp) => match TicketMailer::new(smtp) {
                Ok(mailer) => Some(Arc::new(mailer)),
                Err(err) => {
                    warn!("SMTP mailer disabled: {err}");
                    None
                }
            },
            None => {
                info!("SMTP not configured; ticket delivery disabled");
                None
            }
        };

        Self {
            carts: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            catalog: Arc::new(CatalogService::new(db.clone())),
            orders: Arc::new(OrderService::new(db.clone(), event_sender.clone())),
            payments: Arc::new(PesapalGateway::new(config.pesapal.clone())),
            tickets: Arc::new(TicketService::new(
                db.clone(),
                event_sender,
                config.site_url.clone(),
            )),
            analytics: Arc::new(AnalyticsService::new(db)),
            mailer,
        }
    }
}
