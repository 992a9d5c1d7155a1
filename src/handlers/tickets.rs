use crate::{errors::ServiceError, handlers::common::success_response, AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/verify/:code", get(verify_ticket))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TicketVerification {
    pub valid: bool,
    pub event: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Door scan. First scan of a ticket marks it used and returns
/// `valid: true`; any later scan reports `valid: false` together with the
/// timestamp of the scan that actually admitted someone.
#[utoipa::path(
    get,
    path = "/api/v1/events/verify/{code}",
    params(("code" = Uuid, Path, description = "Ticket code")),
    responses(
        (status = 200, description = "Check-in result", body = TicketVerification),
        (status = 404, description = "Unknown ticket", body = crate::errors::ErrorResponse)
    ),
    tag = "Tickets"
)]
pub async fn verify_ticket(
    State(state): State<Arc<AppState>>,
    Path(code): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state.services.tickets.check_in(code).await?;
    Ok(success_response(TicketVerification {
        valid: result.valid,
        event: result.event,
        used_at: result.used_at,
    }))
}
