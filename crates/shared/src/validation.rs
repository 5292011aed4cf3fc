//! Common validation utilities.

use std::collections::HashMap;

use validator::ValidationError;

/// Maximum length of an event type name.
pub const MAX_EVENT_TYPE_LENGTH: usize = 255;

/// Maximum length of an idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 255;

/// Maximum number of custom headers forwarded with an event.
pub const MAX_CUSTOM_HEADERS: usize = 50;

lazy_static::lazy_static! {
    pub static ref EVENT_TYPE_REGEX: regex::Regex =
        regex::Regex::new(r"^(\*|[A-Za-z0-9][A-Za-z0-9._:/-]*)$").unwrap();
    static ref HEADER_NAME_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z0-9!#$%&'*+.^_`|~-]+$").unwrap();
}

/// Validates an event type: `*` or a dotted/namespaced identifier.
pub fn validate_event_type(event_type: &str) -> Result<(), ValidationError> {
    if event_type.is_empty() || event_type.len() > MAX_EVENT_TYPE_LENGTH {
        let mut err = ValidationError::new("event_type_length");
        err.message = Some("Event type must be between 1 and 255 characters".into());
        return Err(err);
    }

    if !EVENT_TYPE_REGEX.is_match(event_type) {
        let mut err = ValidationError::new("event_type_format");
        err.message = Some("Event type contains invalid characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates an idempotency key: non-blank and bounded.
pub fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LENGTH {
        let mut err = ValidationError::new("idempotency_key_length");
        err.message = Some("Idempotency key must be between 1 and 255 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a delivery target URL: absolute http(s) with a host.
pub fn validate_target_url(url: &str) -> Result<(), ValidationError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));

    match rest {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') && !rest.contains(' ') => Ok(()),
        _ => {
            let mut err = ValidationError::new("target_url");
            err.message = Some("URL must be an absolute http or https URL".into());
            Err(err)
        }
    }
}

/// Validates forwarded custom headers: bounded count and token-safe names.
pub fn validate_custom_headers(headers: &HashMap<String, String>) -> Result<(), ValidationError> {
    if headers.len() > MAX_CUSTOM_HEADERS {
        let mut err = ValidationError::new("custom_headers_count");
        err.message = Some("At most 50 custom headers are allowed".into());
        return Err(err);
    }

    if let Some(name) = headers.keys().find(|name| !HEADER_NAME_REGEX.is_match(name)) {
        let mut err = ValidationError::new("custom_header_name");
        err.message = Some(format!("Invalid header name '{}'", name).into());
        return Err(err);
    }

    Ok(())
}
