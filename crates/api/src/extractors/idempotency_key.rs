//! Idempotency key header extractor.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HeaderName, request::Parts, StatusCode},
};

/// The header name for idempotency keys.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Optional `Idempotency-Key` header; `None` when absent or blank.
///
/// A key in the request body takes precedence over the header.
#[derive(Debug, Clone, Default)]
pub struct OptionalIdempotencyKey(pub Option<String>);

impl OptionalIdempotencyKey {
    /// The body key if present, otherwise the header key.
    pub fn or_body(self, body_key: Option<String>) -> Option<String> {
        body_key.filter(|k| !k.is_empty()).or(self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalIdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_name = HeaderName::from_static(IDEMPOTENCY_KEY_HEADER);

        let key = parts
            .headers
            .get(&header_name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Ok(OptionalIdempotencyKey(key))
    }
}
