use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, instrument};

use super::cart::error_response;
use crate::observability::Metrics;

/// Prometheus scrape endpoint
#[instrument(name = "metrics_handler", skip(metrics))]
pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Response {
    let body = match metrics.encode() {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
                .into_response();
        }
    };

    ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response()
}
