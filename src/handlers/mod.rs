pub mod cart;
pub mod health;
pub mod metrics;
pub mod middleware;

pub use cart::{create_cart_router, service_error_to_response, CartHandlerState};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use middleware::{require_user, USER_EMAIL_HEADER};

use axum::{middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::observability::{observability_middleware, Metrics};
use crate::repositories::UserRepository;
use crate::services::CartService;

/// Build the full application router
pub fn create_app(
    cart_service: Arc<CartService>,
    user_repository: Arc<dyn UserRepository>,
    metrics: Arc<Metrics>,
    request_timeout: Duration,
) -> Router {
    let cart_routes = create_cart_router(CartHandlerState {
        cart_service,
        metrics: metrics.clone(),
    })
    .route_layer(from_fn_with_state(user_repository, require_user));

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics.clone());

    Router::new()
        .merge(cart_routes)
        .merge(metrics_routes)
        .route("/health/status", get(health_check))
        .layer(from_fn_with_state(metrics, observability_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
