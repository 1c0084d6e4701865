use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Order API

Order lifecycle for a small online store: placement, Razorpay payment
reconciliation, fulfillment tracking and customer cancellation.

## Authentication

Customer and admin endpoints require a JWT in the Authorization header:

```
Authorization: Bearer <your-jwt-token>
```

The payment callback (`/api/order/payment-success`) is public and is
authenticated by its HMAC-SHA256 signature instead.

## Error Handling

Failures share one body shape with a stable `code`:

```json
{
  "success": false,
  "error": "Bad Request",
  "code": "INVALID_TRANSITION",
  "message": "Only pending orders can be cancelled",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order lifecycle endpoints"),
    ),
    paths(
        crate::handlers::orders::place_order,
        crate::handlers::orders::payment_success,
        crate::handlers::orders::user_orders,
        crate::handlers::orders::all_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::remove_item,
    ),
    components(
        schemas(
            crate::ResponseMeta,

            // Order types
            crate::entities::OrderStatus,
            crate::entities::PaymentMethod,
            crate::services::orders::PlaceOrderRequest,
            crate::services::orders::OrderItemInput,
            crate::services::orders::ShippingAddress,
            crate::services::orders::PaymentDetails,
            crate::services::orders::OrderView,
            crate::services::orders::OrderItemView,
            crate::services::orders::ProductSummary,
            crate::services::orders::OwnerSummary,
            crate::services::orders::TrackingUpdateView,
            crate::services::orders::OrderPage,
            crate::handlers::orders::PaymentSuccessRequest,
            crate::handlers::orders::PaymentSuccessResponse,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::orders::CancelOrderResponse,
            crate::handlers::orders::RemoveItemResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerSecurity)
)]
pub struct ApiDocV1;

/// Registers the `Bearer` scheme referenced by handler `security(...)` blocks
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
