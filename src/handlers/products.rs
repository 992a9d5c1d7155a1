use crate::{
    entities::product::{self, ProductKind},
    errors::ServiceError,
    handlers::common::{created_response, success_response, validate_input, PaginationParams},
    services::catalog::CreateProductInput,
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventDetailsResponse {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub effective_price: Decimal,
    pub stock: i32,
    pub sales_count: i32,
    pub trending: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventDetailsResponse>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        let event = model.event_details().map(|details| EventDetailsResponse {
            start: details.start,
            end: details.end,
            location: details.location,
        });
        Self {
            id: model.id,
            effective_price: model.effective_price(),
            is_active: model.is_active(),
            title: model.title,
            slug: model.slug,
            description: model.description,
            price: model.price,
            discounted_price: model.discounted_price,
            stock: model.stock,
            sales_count: model.sales_count,
            trending: model.trending,
            event,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 250))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub cost: Option<Decimal>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub trending: bool,
    /// "standard" (default) or "event"
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub kind: Option<ProductKind>,
    pub event_start: Option<DateTime<Utc>>,
    pub event_end: Option<DateTime<Utc>>,
    pub event_location: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(PaginationParams),
    responses((status = 200, description = "Catalog page", body = ProductListResponse)),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (products, total) = state
        .services
        .catalog
        .list_products(pagination.page, pagination.per_page)
        .await?;

    Ok(success_response(ProductListResponse {
        products: products.into_iter().map(ProductResponse::from).collect(),
        total,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(success_response(ProductResponse::from(product)))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let product = state
        .services
        .catalog
        .create_product(CreateProductInput {
            title: payload.title,
            description: payload.description,
            price: payload.price,
            discounted_price: payload.discounted_price,
            cost: payload.cost,
            stock: payload.stock,
            trending: payload.trending,
            kind: payload.kind.unwrap_or(ProductKind::Standard),
            event_start: payload.event_start,
            event_end: payload.event_end,
            event_location: payload.event_location,
        })
        .await?;

    Ok(created_response(ProductResponse::from(product)))
}
