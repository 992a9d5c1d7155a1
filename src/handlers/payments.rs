use crate::{
    entities::order,
    errors::ServiceError,
    handlers::common::success_response,
    services::notifications::TicketAttachment,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pesapal/ipn", post(pesapal_ipn))
        .route("/pesapal/register-ipn", post(register_ipn))
        .route("/status/:order_id", get(payment_status))
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub status: String,
}

/// Asynchronous payment notification from Pesapal. The provider retries
/// until it sees a 200, so every identified order is acknowledged with
/// 200 regardless of the business outcome; only malformed payloads (400)
/// and unknown orders (404) are refused.
#[utoipa::path(
    post,
    path = "/api/v1/payments/pesapal/ipn",
    responses(
        (status = 200, description = "Notification processed"),
        (status = 400, description = "Missing or invalid order id", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn pesapal_ipn(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ServiceError> {
    let tracking_id = body
        .get("OrderTrackingId")
        .or_else(|| body.get("orderTrackingId"))
        .and_then(|value| value.as_str())
        .ok_or_else(|| ServiceError::Validation("Missing order ID".to_string()))?;
    let order_id = Uuid::parse_str(tracking_id)
        .map_err(|_| ServiceError::Validation("Invalid order ID".to_string()))?;

    let notification_type = body
        .get("OrderNotificationType")
        .or_else(|| body.get("orderNotificationType"))
        .and_then(|value| value.as_str())
        .unwrap_or("")
        .to_lowercase();

    // 404 without side effects for orders we do not know.
    let detail = state.services.orders.get_order(order_id).await?;

    if notification_type != "completed" {
        if let Err(err) = state.services.orders.mark_failed(order_id).await {
            // e.g. a late failure notification for an order that already
            // went through; acknowledged anyway to stop provider retries.
            warn!(order_id = %order_id, "could not record failed payment: {err}");
        }
        return Ok(success_response(
            json!({ "detail": "Payment pending or failed" }),
        ));
    }

    match state.services.orders.mark_paid(order_id).await {
        Ok(order) => {
            tokio::spawn(deliver_tickets(state.clone(), order));
            Ok(success_response(json!({ "detail": "Payment confirmed" })))
        }
        Err(err) => {
            // Business failure (e.g. stock sold out between checkout and
            // confirmation). The notification is still acknowledged.
            error!(
                order_id = %detail.order.id,
                "payment confirmation failed: {err}"
            );
            Ok(success_response(
                json!({ "detail": "Payment received but order could not be confirmed" }),
            ))
        }
    }
}

/// Fire-and-forget ticket delivery. Runs after the paid transition has
/// committed; any failure here is logged and never affects the order.
async fn deliver_tickets(state: Arc<AppState>, order: order::Model) {
    let Some(recipient) = order
        .shipping_address
        .as_ref()
        .and_then(|address| address.get("email"))
        .and_then(|value| value.as_str())
        .map(str::to_string)
    else {
        info!(order_id = %order.id, "no contact email on order; skipping ticket delivery");
        return;
    };

    let tickets = match state.services.tickets.tickets_for_order(order.id).await {
        Ok(tickets) => tickets,
        Err(err) => {
            error!(order_id = %order.id, "could not load tickets for delivery: {err}");
            return;
        }
    };
    if tickets.is_empty() {
        return;
    }

    let Some(mailer) = state.services.mailer.clone() else {
        info!(order_id = %order.id, "mailer disabled; tickets remain retrievable by order");
        return;
    };

    let mut attachments = Vec::with_capacity(tickets.len());
    for issued in tickets {
        match state.services.tickets.qr_svg(issued.ticket.code) {
            Ok(qr_svg) => attachments.push(TicketAttachment {
                code: issued.ticket.code,
                event: issued.event,
                qr_svg,
            }),
            Err(err) => error!(code = %issued.ticket.code, "QR rendering failed: {err}"),
        }
    }

    if let Err(err) = mailer.send_tickets(&recipient, order.id, &attachments).await {
        error!(order_id = %order.id, "ticket email failed: {err}");
    }
}

/// One-time operator action registering the IPN callback with Pesapal.
pub async fn register_ipn(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let ipn_id = state.services.payments.register_ipn().await?;
    Ok(success_response(json!({ "ipn_id": ipn_id })))
}

/// Buyer-facing polling endpoint while waiting on the hosted payment page.
#[utoipa::path(
    get,
    path = "/api/v1/payments/status/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Current order status", body = PaymentStatusResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state.services.orders.payment_status(order_id).await?;
    Ok(success_response(PaymentStatusResponse {
        status: status.as_str().to_string(),
    }))
}
