//! API key authentication middleware.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::crypto::{constant_time_eq, sha256_hex};

use crate::app::AppState;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Requires an `X-API-Key` whose SHA-256 digest is in `security.api_key_hashes`.
///
/// With no hashes configured every request is let through.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let hashes = &state.config.security.api_key_hashes;
    if hashes.is_empty() {
        return next.run(req).await;
    }

    let Some(api_key) = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
    else {
        return ApiError::Unauthorized("Invalid or missing API key".into()).into_response();
    };

    let digest = sha256_hex(api_key);
    if hashes
        .iter()
        .any(|hash| constant_time_eq(&hash.to_ascii_lowercase(), &digest))
    {
        next.run(req).await
    } else {
        tracing::warn!(path = %req.uri().path(), "Rejected request with unknown API key");
        ApiError::Unauthorized("Invalid or missing API key".into()).into_response()
    }
}
