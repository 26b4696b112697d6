use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::cart::{error_response, service_error_to_response, ErrorResponse};
use crate::models::ServiceError;
use crate::repositories::UserRepository;

/// Header carrying the caller identity asserted by the upstream gateway
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Resolve the caller into a `User` and store it in request extensions
pub async fn require_user(
    State(users): State<Arc<dyn UserRepository>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ErrorResponse> {
    let email = request
        .headers()
        .get(USER_EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string);

    let Some(email) = email else {
        warn!("Request without caller identity");
        return Err(unauthenticated());
    };

    let user = users
        .find_by_email(&email)
        .await
        .map_err(|e| service_error_to_response(ServiceError::from(e)))?;

    match user {
        Some(user) => {
            debug!(email = %user.email, "Caller authenticated");
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        None => {
            warn!(email = %email, "Unknown caller");
            Err(unauthenticated())
        }
    }
}

fn unauthenticated() -> ErrorResponse {
    error_response(StatusCode::UNAUTHORIZED, "Please authenticate")
}
