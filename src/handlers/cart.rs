use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, put},
    Extension, Router,
};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::models::{
    Cart, CartItemRequest, ErrorKind, ServiceError, ServiceResult, User,
};
use crate::observability::Metrics;
use crate::services::CartService;

pub type ErrorResponse = (StatusCode, Json<Value>);

/// State for cart handlers
#[derive(Clone)]
pub struct CartHandlerState {
    pub cart_service: Arc<CartService>,
    pub metrics: Arc<Metrics>,
}

/// Cart routes. Every handler expects the authenticated `User` in request extensions.
pub fn create_cart_router(state: CartHandlerState) -> Router {
    Router::new()
        .route(
            "/v1/cart",
            get(get_cart).post(add_product).put(update_product),
        )
        .route("/v1/cart/items/:product_id", delete(delete_product))
        .route("/v1/cart/checkout", put(checkout).post(checkout))
        .with_state(state)
}

#[instrument(skip(state, user), fields(email = %user.email))]
pub async fn get_cart(
    State(state): State<CartHandlerState>,
    Extension(user): Extension<User>,
) -> Result<Json<Cart>, ErrorResponse> {
    let result = state.cart_service.get_cart_by_user(&user).await;
    respond(&state.metrics, "get_cart", result).map(Json)
}

#[instrument(skip(state, user, payload), fields(email = %user.email))]
pub async fn add_product(
    State(state): State<CartHandlerState>,
    Extension(user): Extension<User>,
    payload: Result<Json<CartItemRequest>, JsonRejection>,
) -> Result<Json<Cart>, ErrorResponse> {
    let (product_id, quantity) = validate_request(payload)?;
    if quantity == 0 {
        return Err(validation_error("\"quantity\" must be greater than 0"));
    }

    info!(product_id = %product_id, quantity, "Adding product to cart");
    let result = state
        .cart_service
        .add_product_to_cart(&user, &product_id, quantity)
        .await;
    respond(&state.metrics, "add_product", result).map(Json)
}

/// A quantity of zero removes the product
#[instrument(skip(state, user, payload), fields(email = %user.email))]
pub async fn update_product(
    State(state): State<CartHandlerState>,
    Extension(user): Extension<User>,
    payload: Result<Json<CartItemRequest>, JsonRejection>,
) -> Result<Json<Cart>, ErrorResponse> {
    let (product_id, quantity) = validate_request(payload)?;

    if quantity == 0 {
        info!(product_id = %product_id, "Quantity 0, removing product from cart");
        let result = state
            .cart_service
            .delete_product_from_cart(&user, &product_id)
            .await;
        return respond(&state.metrics, "delete_product", result).map(Json);
    }

    info!(product_id = %product_id, quantity, "Updating product quantity");
    let result = state
        .cart_service
        .update_product_in_cart(&user, &product_id, quantity)
        .await;
    respond(&state.metrics, "update_product", result).map(Json)
}

#[instrument(skip(state, user), fields(email = %user.email))]
pub async fn delete_product(
    State(state): State<CartHandlerState>,
    Extension(user): Extension<User>,
    Path(product_id): Path<String>,
) -> Result<Json<Cart>, ErrorResponse> {
    let result = state
        .cart_service
        .delete_product_from_cart(&user, &product_id)
        .await;
    respond(&state.metrics, "delete_product", result).map(Json)
}

#[instrument(skip(state, user), fields(email = %user.email))]
pub async fn checkout(
    State(state): State<CartHandlerState>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, ErrorResponse> {
    let summary = respond(&state.metrics, "checkout", state.cart_service.checkout(&user).await)?;

    state
        .metrics
        .record_checkout_value(summary.total.to_f64().unwrap_or_default());
    info!(total = %summary.total, wallet_money = %summary.wallet_money, "Checkout succeeded");
    Ok(StatusCode::NO_CONTENT)
}

/// Record the operation outcome and convert failures into error responses
fn respond<T>(metrics: &Metrics, operation: &str, result: ServiceResult<T>) -> Result<T, ErrorResponse> {
    match result {
        Ok(value) => {
            metrics.record_cart_operation(operation, "success");
            Ok(value)
        }
        Err(err) => {
            metrics.record_cart_operation(operation, status_label(&err));
            Err(service_error_to_response(err))
        }
    }
}

/// Metric status for a failure, consistent with the HTTP status it maps to
fn status_label(err: &ServiceError) -> &'static str {
    match err.status_code() {
        StatusCode::CONFLICT => "conflict",
        StatusCode::GATEWAY_TIMEOUT => "timeout",
        _ => kind_label(err.kind()),
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "not_found",
        ErrorKind::BadRequest => "bad_request",
        ErrorKind::InternalError => "internal_error",
    }
}

fn validate_request(
    payload: Result<Json<CartItemRequest>, JsonRejection>,
) -> Result<(String, u32), ErrorResponse> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected request body: {}", rejection.body_text());
        validation_error(&rejection.body_text())
    })?;

    let product_id = request.product_id.trim();
    if product_id.is_empty() {
        return Err(validation_error("\"productId\" is not allowed to be empty"));
    }

    let quantity = request
        .quantity
        .ok_or_else(|| validation_error("\"quantity\" is required"))?;

    Ok((product_id.to_string(), quantity))
}

fn validation_error(message: &str) -> ErrorResponse {
    service_error_to_response(ServiceError::Validation {
        message: message.to_string(),
    })
}

pub fn error_response(status: StatusCode, message: &str) -> ErrorResponse {
    (
        status,
        Json(json!({
            "code": status.as_u16(),
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// Convert ServiceError to HTTP response. Storage details never reach the client.
pub fn service_error_to_response(err: ServiceError) -> ErrorResponse {
    let status = err.status_code();
    let message = match &err {
        ServiceError::Repository(_) if status == StatusCode::CONFLICT => {
            "Cart was modified concurrently, please retry".to_string()
        }
        ServiceError::Repository(_) if status == StatusCode::GATEWAY_TIMEOUT => {
            "Request timeout".to_string()
        }
        ServiceError::Repository(_) => "Internal Server Error".to_string(),
        _ => err.to_string(),
    };

    if status.is_server_error() {
        error!(error = %err, "Cart operation failed");
    }

    error_response(status, &message)
}
