use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::{
        checkout::{CheckoutSessionResponse, ShippingAddressRequest, ShippingAddressView},
        orders::OrderView,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::checkout_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shipping", put(set_shipping_address))
        .route("/session", post(create_payment_session))
        .route("/confirm/{cart_token}", post(confirm))
        .route("/cancel", get(payment_cancel))
}

#[utoipa::path(
    put,
    path = "/api/checkout/shipping",
    request_body = ShippingAddressRequest,
    responses(
        (status = 200, description = "Attach a shipping address to the active cart", body = ApiResponse<ShippingAddressView>),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Cart empty or has conflicts"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn set_shipping_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ShippingAddressRequest>,
) -> AppResult<Json<ApiResponse<ShippingAddressView>>> {
    let resp = checkout_service::set_shipping_address(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/checkout/session",
    responses(
        (status = 200, description = "Create a hosted payment session", body = ApiResponse<CheckoutSessionResponse>),
        (status = 409, description = "Cart empty, has conflicts, or no shipping address"),
        (status = 502, description = "Payment gateway unavailable; cart unchanged"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_payment_session(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CheckoutSessionResponse>>> {
    let resp = checkout_service::create_payment_session(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/checkout/confirm/{cart_token}",
    params(("cart_token" = Uuid, Path, description = "Opaque cart token from the success redirect")),
    responses(
        (status = 200, description = "Convert the paid-for cart into an order", body = ApiResponse<OrderView>),
        (status = 403, description = "Wrong owner, inactive cart, or duplicate confirmation"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn confirm(
    State(state): State<AppState>,
    user: AuthUser,
    Path(cart_token): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderView>>> {
    let resp = checkout_service::confirm(&state, &user, cart_token).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/checkout/cancel",
    responses(
        (status = 200, description = "Payment canceled; nothing was changed", body = ApiResponse<serde_json::Value>),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn payment_cancel(
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(ApiResponse::success(
        "Payment canceled",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}
