use crate::{config::SmtpConfig, errors::ServiceError};
use lettre::{
    message::{header::ContentType, Attachment, Body, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, instrument};
use uuid::Uuid;

/// One ticket as it appears in the delivery email.
#[derive(Debug, Clone)]
pub struct TicketAttachment {
    pub code: Uuid,
    pub event: Option<String>,
    pub qr_svg: String,
}

/// Sends ticket emails over SMTP. Strictly a downstream consumer of the
/// paid transition: the caller fires it after commit and a delivery
/// failure is logged, never propagated back into payment confirmation.
#[derive(Clone)]
pub struct TicketMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl TicketMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, ServiceError> {
        let credentials = Credentials::new(cfg.username.clone(), cfg.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.server)
            .map_err(|e| ServiceError::Internal(format!("SMTP relay error: {e}")))?
            .port(cfg.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from: format!("{} <{}>", cfg.from_name, cfg.from_email),
        })
    }

    /// One message per order: an HTML summary plus one QR attachment per
    /// issued ticket.
    #[instrument(skip(self, tickets), fields(order_id = %order_id, count = tickets.len()))]
    pub async fn send_tickets(
        &self,
        recipient: &str,
        order_id: Uuid,
        tickets: &[TicketAttachment],
    ) -> Result<(), ServiceError> {
        if tickets.is_empty() {
            return Ok(());
        }

        let mut lines = vec!["<h3>Your Tickets</h3>".to_string(), "<ul>".to_string()];
        for ticket in tickets {
            lines.push(format!(
                "<li>{}</li>",
                ticket.event.as_deref().unwrap_or("Event admission")
            ));
        }
        lines.push("</ul>".to_string());
        lines.push("<p>Show the attached QR codes at entry. Each code admits one person once.</p>".to_string());
        let html = lines.join("\n");

        let mut multipart = MultiPart::mixed().singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(html),
        );

        let svg_type = ContentType::parse("image/svg+xml")
            .map_err(|e| ServiceError::Internal(format!("bad attachment content type: {e}")))?;
        for ticket in tickets {
            multipart = multipart.singlepart(
                Attachment::new(format!("ticket-{}.svg", ticket.code))
                    .body(Body::new(ticket.qr_svg.clone().into_bytes()), svg_type.clone()),
            );
        }

        let message = Message::builder()
            .from(self
                .from
                .parse()
                .map_err(|e| ServiceError::Internal(format!("invalid from address: {e}")))?)
            .to(recipient
                .parse()
                .map_err(|e| ServiceError::Internal(format!("invalid recipient address: {e}")))?)
            .subject(format!("Your tickets for order {}", order_id))
            .multipart(multipart)
            .map_err(|e| ServiceError::Internal(format!("failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| ServiceError::Internal(format!("failed to send email: {e}")))?;

        info!("ticket email dispatched");
        Ok(())
    }
}
