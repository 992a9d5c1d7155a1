use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers::carts::{
    AddItemRequest, CartItemResponse, CartResponse, CheckoutRequest, CheckoutResponse,
};
use crate::handlers::orders::{OrderItemResponse, OrderListResponse, OrderResponse};
use crate::handlers::payments::PaymentStatusResponse;
use crate::handlers::products::{
    CreateProductRequest, EventDetailsResponse, ProductListResponse, ProductResponse,
};
use crate::handlers::tickets::TicketVerification;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "comicstand-api",
        description = "Comics storefront backend: catalog, carts, Pesapal checkout and event ticketing"
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::checkout,
        crate::handlers::orders::get_order,
        crate::handlers::payments::pesapal_ipn,
        crate::handlers::payments::payment_status,
        crate::handlers::tickets::verify_ticket,
    ),
    components(schemas(
        ErrorResponse,
        ProductResponse,
        ProductListResponse,
        EventDetailsResponse,
        CreateProductRequest,
        CartResponse,
        CartItemResponse,
        AddItemRequest,
        CheckoutRequest,
        CheckoutResponse,
        OrderResponse,
        OrderItemResponse,
        OrderListResponse,
        PaymentStatusResponse,
        TicketVerification,
    )),
    tags(
        (name = "Products", description = "Catalog"),
        (name = "Cart", description = "Actor-scoped shopping cart"),
        (name = "Orders", description = "Order lifecycle"),
        (name = "Payments", description = "Pesapal checkout and notifications"),
        (name = "Tickets", description = "Event ticket verification"),
        (name = "Health", description = "Probes")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at /docs, spec at /api-docs/openapi.json.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
