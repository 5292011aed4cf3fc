//! Error taxonomy shared by every gateway operation.

use shared::jwt::JwtError;
use thiserror::Error;

/// Typed error returned by all gateway services.
///
/// `code()` is the machine-readable category; `Display` is the operator-facing message.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    StateConflict(String),

    #[error("Dependency failure: {0}")]
    Dependency(String),

    #[error("OAuth2 token exchange failed: {0}")]
    AuthExchange(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl GatewayError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        GatewayError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Machine-readable error category.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "validation_error",
            GatewayError::NotFound { .. } => "not_found",
            GatewayError::StateConflict(_) => "state_conflict",
            GatewayError::Dependency(_) => "dependency_error",
            GatewayError::AuthExchange(_) => "auth_exchange_error",
            GatewayError::Configuration(_) => "configuration_error",
            GatewayError::Timeout(_) => "timeout",
        }
    }

    /// Whether the caller may retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Dependency(_) | GatewayError::Timeout(_))
    }
}

/// Failure reported by a repository port.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

/// Failure reported by the job queue port.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue write failed: {0}")]
    Write(String),

    #[error("failed to serialize task: {0}")]
    Serialization(String),
}

/// Failure reported by the token cache port.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("malformed cache entry: {0}")]
    Malformed(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCursor(msg) => GatewayError::Validation(msg),
            other => GatewayError::Dependency(other.to_string()),
        }
    }
}

impl From<QueueError> for GatewayError {
    fn from(err: QueueError) -> Self {
        GatewayError::Dependency(err.to_string())
    }
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        GatewayError::Dependency(err.to_string())
    }
}

impl From<JwtError> for GatewayError {
    fn from(err: JwtError) -> Self {
        GatewayError::AuthExchange(err.to_string())
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        messages.sort();
        GatewayError::Validation(messages.join("; "))
    }
}
