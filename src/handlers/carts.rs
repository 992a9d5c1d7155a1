use crate::{
    entities::{order, order_item},
    errors::ServiceError,
    events::Event,
    handlers::common::{session_response, validate_input},
    services::carts::{Actor, CartView},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", delete(remove_item))
        .route("/items/:product_id/increase", post(increase_item))
        .route("/items/:product_id/decrease", post(decrease_item))
        .route("/checkout", post(checkout))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub order_id: Option<Uuid>,
    pub items: Vec<CartItemResponse>,
    pub total: Decimal,
}

impl CartResponse {
    fn empty() -> Self {
        Self {
            order_id: None,
            items: Vec::new(),
            total: Decimal::ZERO,
        }
    }

    fn from_parts(order: &order::Model, items: &[order_item::Model]) -> Self {
        Self {
            order_id: Some(order.id),
            items: items
                .iter()
                .map(|item| CartItemResponse {
                    id: item.id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    subtotal: item.subtotal(),
                })
                .collect(),
            total: order.total,
        }
    }
}

impl From<&CartView> for CartResponse {
    fn from(view: &CartView) -> Self {
        Self::from_parts(&view.order, &view.items)
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Free-form structured address; `email`, `first_name` and
    /// `last_name` feed the gateway's billing contact.
    #[schema(value_type = Option<Object>)]
    pub shipping_address: Option<serde_json::Value>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub payment_url: String,
    pub order_id: Uuid,
}

/// Current cart for the calling actor. Guests without a cart get an empty
/// cart body rather than a 404.
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses((status = 200, description = "Current cart", body = CartResponse)),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor.ensured();
    let session_key = actor.session_key.clone().unwrap_or_default();

    let view = state.services.carts.resolve_cart(&actor, false).await?;
    let body = view
        .as_ref()
        .map(CartResponse::from)
        .unwrap_or_else(CartResponse::empty);
    Ok(session_response(&session_key, body))
}

/// Add a product to the cart (or bump the quantity of its existing line).
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let actor = actor.ensured();

    let view = state
        .services
        .carts
        .add_item(&actor, payload.product_id, payload.quantity)
        .await?;
    Ok(session_response(&view.session_key, CartResponse::from(&view)))
}

pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor.ensured();
    let view = state.services.carts.remove_item(&actor, item_id).await?;
    Ok(session_response(&view.session_key, CartResponse::from(&view)))
}

pub async fn increase_item(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor.ensured();
    let view = state.services.carts.increase_item(&actor, product_id).await?;
    Ok(session_response(&view.session_key, CartResponse::from(&view)))
}

pub async fn decrease_item(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor.ensured();
    let view = state.services.carts.decrease_item(&actor, product_id).await?;
    Ok(session_response(&view.session_key, CartResponse::from(&view)))
}

/// Start checkout: stamp contact details on the cart, submit it to the
/// payment gateway and hand the buyer the hosted-payment redirect. Order
/// status is NOT advanced here — confirmation arrives via the IPN.
#[utoipa::path(
    post,
    path = "/api/v1/cart/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Redirect to hosted payment page", body = CheckoutResponse),
        (status = 400, description = "Empty cart or missing contact email", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor.ensured();

    let view = state
        .services
        .carts
        .prepare_checkout(&actor, payload.shipping_address, payload.phone_number)
        .await?;

    let email = view
        .order
        .shipping_address
        .as_ref()
        .and_then(|address| address.get("email"))
        .and_then(|value| value.as_str())
        .ok_or_else(|| {
            ServiceError::Validation("shipping_address.email is required".to_string())
        })?;

    let payment_url = state
        .services
        .payments
        .initiate_payment(&view.order, email, view.order.phone_number.as_deref())
        .await?;

    state
        .event_sender
        .send_or_log(Event::PaymentInitiated(view.order.id))
        .await;

    Ok(session_response(
        &view.session_key,
        CheckoutResponse {
            payment_url,
            order_id: view.order.id,
        },
    ))
}
