use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery};
use crate::{
    auth::AuthUser,
    entities::OrderStatus,
    errors::ServiceError,
    services::orders::{ItemRemoval, OrderListFilter, OrderPage, OrderView, PaymentDetails, PlaceOrderRequest},
    ApiResponse, AppState,
};

pub const ORDER_PLACED: &str = "Order placed successfully!";
pub const PAYMENT_VERIFIED: &str = "Payment verified and order updated.";
pub const STATUS_UPDATED: &str = "Order status updated";
pub const ORDER_CANCELLED: &str = "Order cancelled successfully";
pub const ORDER_CANCELLED_NO_EMAIL: &str =
    "Order cancelled successfully, but failed to send email notification";
pub const ITEM_REMOVED: &str = "Order item deleted successfully";
pub const ORDER_REMOVED: &str = "Item deleted. Order was empty and removed.";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSuccessRequest {
    pub order_id: Uuid,
    pub payment_details: PaymentDetails,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSuccessResponse {
    pub order: OrderView,
    pub already_confirmed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub location: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderResponse {
    pub order: OrderView,
    pub email_sent: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemResponse {
    pub order_id: Uuid,
    pub order_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderView>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AllOrdersQuery {
    /// Page number (default: 1)
    pub page: Option<u64>,
    /// Items per page (default: 20, max: 100)
    pub limit: Option<u64>,
    /// Only orders in this status
    pub status: Option<OrderStatus>,
}

impl From<AllOrdersQuery> for OrderListFilter {
    fn from(query: AllOrdersQuery) -> Self {
        Self {
            page: query.page,
            limit: query.limit,
            status: query.status,
        }
    }
}

/// Place a new order for the authenticated user
#[utoipa::path(
    post,
    path = "/api/order/place",
    tag = "Orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderView>),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment provider or internal failure", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn place_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(request): ApiJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderView>>), ServiceError> {
    let order = state.orders.place_order(auth_user.user_id, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(order, ORDER_PLACED)),
    ))
}

/// Razorpay checkout callback; authenticated by the payment signature
#[utoipa::path(
    post,
    path = "/api/order/payment-success",
    tag = "Orders",
    request_body = PaymentSuccessRequest,
    responses(
        (status = 200, description = "Payment verified", body = ApiResponse<PaymentSuccessResponse>),
        (status = 400, description = "Signature mismatch or invalid transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order changed concurrently", body = crate::errors::ErrorResponse),
    )
)]
pub async fn payment_success(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PaymentSuccessRequest>,
) -> Result<Json<ApiResponse<PaymentSuccessResponse>>, ServiceError> {
    let confirmation = state
        .orders
        .confirm_payment(request.order_id, request.payment_details)
        .await?;

    Ok(Json(ApiResponse::with_message(
        PaymentSuccessResponse {
            order: confirmation.order,
            already_confirmed: confirmation.already_confirmed,
        },
        PAYMENT_VERIFIED,
    )))
}

/// Orders belonging to the authenticated user, newest first
#[utoipa::path(
    get,
    path = "/api/order/userOrders",
    tag = "Orders",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderView>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn user_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderView>>>, ServiceError> {
    let orders = state.orders.list_user_orders(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Every order in the store (admin)
#[utoipa::path(
    get,
    path = "/api/order/all-orders",
    tag = "Orders",
    params(AllOrdersQuery),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<OrderPage>),
        (status = 400, description = "Invalid query", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn all_orders(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AllOrdersQuery>,
) -> Result<Json<ApiResponse<OrderPage>>, ServiceError> {
    let page = state.orders.list_all_orders(query.into()).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// A single order, visible to its owner or an admin
#[utoipa::path(
    get,
    path = "/api/order/{orderId}",
    tag = "Orders",
    params(("orderId" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiPath(order_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let order = state.orders.get_order(order_id, &auth_user).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Move an order through fulfillment (admin)
#[utoipa::path(
    put,
    path = "/api/order/update-status",
    tag = "Orders",
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderView>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order changed concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let order = state
        .orders
        .update_status(
            request.order_id,
            request.status,
            request.location,
            request.description,
        )
        .await?;

    info!(order_id = %order.id, admin = %auth_user.user_id, status = %order.status, "Status changed by admin");
    Ok(Json(ApiResponse::with_message(order, STATUS_UPDATED)))
}

/// Cancel a pending order and notify the customer
#[utoipa::path(
    put,
    path = "/api/order/cancel/{orderId}",
    tag = "Orders",
    params(("orderId" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<CancelOrderResponse>),
        (status = 400, description = "Order is not pending", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or user not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiPath(order_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<CancelOrderResponse>>, ServiceError> {
    let outcome = state.orders.cancel_order(order_id, &auth_user).await?;
    let message = if outcome.email_sent {
        ORDER_CANCELLED
    } else {
        ORDER_CANCELLED_NO_EMAIL
    };

    Ok(Json(ApiResponse::with_message(
        CancelOrderResponse {
            order: outcome.order,
            email_sent: outcome.email_sent,
        },
        message,
    )))
}

/// Remove every line for a product; an order left empty is deleted
#[utoipa::path(
    delete,
    path = "/api/order/item/{orderId}/{productId}",
    tag = "Orders",
    params(
        ("orderId" = Uuid, Path, description = "Order id"),
        ("productId" = Uuid, Path, description = "Product to remove"),
    ),
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<RemoveItemResponse>),
        (status = 400, description = "Order can no longer be modified", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn remove_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiPath((order_id, product_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<RemoveItemResponse>>, ServiceError> {
    let response = match state
        .orders
        .remove_item(order_id, product_id, &auth_user)
        .await?
    {
        ItemRemoval::OrderDeleted(order_id) => ApiResponse::with_message(
            RemoveItemResponse {
                order_id,
                order_deleted: true,
                order: None,
            },
            ORDER_REMOVED,
        ),
        ItemRemoval::ItemRemoved(order) => ApiResponse::with_message(
            RemoveItemResponse {
                order_id: order.id,
                order_deleted: false,
                order: Some(order),
            },
            ITEM_REMOVED,
        ),
    };

    Ok(Json(response))
}
