use crate::{
    entities::{order, order_item},
    errors::ServiceError,
    handlers::common::{success_response, PaginationParams},
    services::orders::OrderDetail,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/pay", post(pay_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/refund", post(refund_order))
        .route("/:id/ship", post(ship_order))
        .route("/:id/complete", post(complete_order))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: String,
    pub total: Decimal,
    #[schema(value_type = Option<Object>)]
    pub shipping_address: Option<serde_json::Value>,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItemResponse>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

fn item_response(item: &order_item::Model) -> OrderItemResponse {
    OrderItemResponse {
        id: item.id,
        product_id: item.product_id,
        quantity: item.quantity,
        unit_price: item.unit_price,
        subtotal: item.subtotal(),
    }
}

fn order_response(order: order::Model, items: Option<&[order_item::Model]>) -> OrderResponse {
    OrderResponse {
        id: order.id,
        user_id: order.user_id,
        status: order.status.as_str().to_string(),
        total: order.total,
        shipping_address: order.shipping_address,
        phone_number: order.phone_number,
        created_at: order.created_at,
        items: items.map(|items| items.iter().map(item_response).collect()),
    }
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(pagination.page, pagination.per_page)
        .await?;

    Ok(success_response(OrderListResponse {
        orders: orders
            .into_iter()
            .map(|order| order_response(order, None))
            .collect(),
        total,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with line items", body = OrderResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let OrderDetail { order, items } = state.services.orders.get_order(id).await?;
    Ok(success_response(order_response(order, Some(&items))))
}

/// Manual confirmation for operators; runs the same paid transition the
/// IPN uses.
pub async fn pay_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.mark_paid(id).await?;
    Ok(success_response(order_response(order, None)))
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.cancel(id).await?;
    Ok(success_response(order_response(order, None)))
}

pub async fn refund_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.refund(id).await?;
    Ok(success_response(order_response(order, None)))
}

pub async fn ship_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.ship(id).await?;
    Ok(success_response(order_response(order, None)))
}

pub async fn complete_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.complete(id).await?;
    Ok(success_response(order_response(order, None)))
}
