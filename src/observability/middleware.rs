use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::{sync::Arc, time::Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::Metrics;

/// Opens a server span per request, logs its completion and records HTTP metrics
pub async fn observability_middleware(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    // Group by route template so path parameters don't explode label cardinality
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched_path| matched_path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let span = info_span!(
        "http_request",
        request_id = %Uuid::new_v4(),
        method = %method,
        endpoint = %endpoint,
        "otel.kind" = "server",
        "otel.name" = format!("{} {}", method, endpoint),
    );

    metrics.increment_in_flight(&method, &endpoint);

    let response = async {
        info!("Processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start_time.elapsed();
    let status_code = response.status().as_u16();

    metrics.record_http_request(&method, &endpoint, status_code, duration.as_secs_f64());
    metrics.decrement_in_flight(&method, &endpoint);

    span.in_scope(|| {
        if status_code >= 500 {
            error!(
                status_code = status_code,
                duration_ms = duration.as_millis(),
                "Request completed with error"
            );
        } else if status_code >= 400 {
            warn!(
                status_code = status_code,
                duration_ms = duration.as_millis(),
                "Request rejected"
            );
        } else {
            info!(
                status_code = status_code,
                duration_ms = duration.as_millis(),
                "Request completed successfully"
            );
        }
    });

    response
}
