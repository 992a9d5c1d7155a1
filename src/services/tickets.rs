use crate::{
    entities::{event_ticket, order_item, EventTicket, OrderItem, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use qrcode::{render::svg, QrCode};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Outcome of a check-in scan.
#[derive(Debug, Clone)]
pub struct CheckIn {
    pub valid: bool,
    pub event: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
}

/// A ticket along with the event title it admits to.
#[derive(Debug, Clone)]
pub struct IssuedTicket {
    pub ticket: event_ticket::Model,
    pub event: Option<String>,
}

/// Verifies tickets at the door and renders their QR codes. Issuance
/// itself happens inside the paid transition owned by the order service.
#[derive(Clone)]
pub struct TicketService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    site_url: String,
}

impl TicketService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>, site_url: String) -> Self {
        Self {
            db,
            event_sender,
            site_url,
        }
    }

    /// Check a ticket in. Unknown codes are `NotFound`; a used ticket
    /// reports `valid: false` with its ORIGINAL `used_at` (a second scan
    /// must never look like a fresh check-in); an unused ticket is marked
    /// used atomically — the conditional update plus affected-row check
    /// means exactly one of two racing scans wins.
    #[instrument(skip(self))]
    pub async fn check_in(&self, code: Uuid) -> Result<CheckIn, ServiceError> {
        let ticket = EventTicket::find()
            .filter(event_ticket::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invalid ticket".to_string()))?;

        let event = self.event_title(&ticket).await?;

        if ticket.used {
            return Ok(CheckIn {
                valid: false,
                event,
                used_at: ticket.used_at,
            });
        }

        let now = Utc::now();
        let result = EventTicket::update_many()
            .col_expr(event_ticket::Column::Used, Expr::value(true))
            .col_expr(event_ticket::Column::UsedAt, Expr::value(now))
            .filter(event_ticket::Column::Code.eq(code))
            .filter(event_ticket::Column::Used.eq(false))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Lost the race to a concurrent scan; report the timestamp
            // that scan wrote.
            let ticket = EventTicket::find()
                .filter(event_ticket::Column::Code.eq(code))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Invalid ticket".to_string()))?;
            return Ok(CheckIn {
                valid: false,
                event,
                used_at: ticket.used_at,
            });
        }

        self.event_sender
            .send_or_log(Event::TicketCheckedIn { code })
            .await;
        info!(code = %code, "ticket checked in");

        Ok(CheckIn {
            valid: true,
            event,
            used_at: Some(now),
        })
    }

    /// The title of the event this ticket admits to, when the product
    /// still exists.
    async fn event_title(
        &self,
        ticket: &event_ticket::Model,
    ) -> Result<Option<String>, ServiceError> {
        let Some(item) = OrderItem::find_by_id(ticket.order_item_id)
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };
        match item.product_id {
            Some(product_id) => Ok(Product::find_by_id(product_id)
                .one(&*self.db)
                .await?
                .map(|product| product.title)),
            None => Ok(None),
        }
    }

    /// Every ticket issued for an order, with event titles, in issuance
    /// order. This is the "tickets are retrievable by order" surface the
    /// mailer and the API build on.
    pub async fn tickets_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<IssuedTicket>, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let mut issued = Vec::new();
        for item in items {
            let tickets = item.find_related(EventTicket).all(&*self.db).await?;
            if tickets.is_empty() {
                continue;
            }
            let title = match item.product_id {
                Some(product_id) => Product::find_by_id(product_id)
                    .one(&*self.db)
                    .await?
                    .map(|p| p.title),
                None => None,
            };
            for ticket in tickets {
                issued.push(IssuedTicket {
                    ticket,
                    event: title.clone(),
                });
            }
        }
        Ok(issued)
    }

    /// The URL a scanner hits for this code; also what the QR encodes.
    pub fn verification_url(&self, code: Uuid) -> String {
        format!(
            "{}/api/v1/events/verify/{}",
            self.site_url.trim_end_matches('/'),
            code
        )
    }

    /// Render the verification URL as an SVG QR code.
    pub fn qr_svg(&self, code: Uuid) -> Result<String, ServiceError> {
        let qr = QrCode::new(self.verification_url(code).as_bytes())
            .map_err(|e| ServiceError::Internal(format!("QR encoding failed: {e}")))?;
        Ok(qr
            .render::<svg::Color>()
            .min_dimensions(240, 240)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build())
    }

    /// Base64 form for embedding in API responses and email bodies.
    pub fn qr_base64(&self, code: Uuid) -> Result<String, ServiceError> {
        Ok(BASE64.encode(self.qr_svg(code)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn service() -> TicketService {
        let (tx, _rx) = mpsc::channel(8);
        TicketService::new(
            Arc::new(DatabaseConnection::Disconnected),
            Arc::new(EventSender::new(tx)),
            "https://shop.example.com/".to_string(),
        )
    }

    #[test]
    fn verification_url_has_no_double_slash() {
        let svc = service();
        let code = Uuid::new_v4();
        assert_eq!(
            svc.verification_url(code),
            format!("https://shop.example.com/api/v1/events/verify/{code}")
        );
    }

    #[test]
    fn qr_renders_svg_markup() {
        let svc = service();
        let markup = svc.qr_svg(Uuid::new_v4()).expect("qr");
        assert!(markup.starts_with("<?xml") || markup.starts_with("<svg"));
        assert!(markup.contains("svg"));
    }
}
