//! OAuth2 client-credentials tokens for endpoints that authenticate with bearer tokens.
//!
//! Tokens are cached per endpoint and refreshed ahead of expiry: a token is stale once
//! it enters its refresh window, which is 10% of its lifetime capped at
//! `max_refresh_buffer`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::models::{
    Endpoint, EndpointAuthentication, ExpiryTimeUnit, OAuth2Config as EndpointOAuth2Config,
    OAuth2FieldMapping, OAuth2Grant,
};
use domain::repositories::TokenCache;
use domain::{GatewayError, RequestContext};
use metrics::counter;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::jwt::AssertionSigner;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime assumed when the token response carries no `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

const REFRESH_BUFFER_PERCENT: i64 = 10;

#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub http_timeout: Duration,
    pub max_cache_ttl: Duration,
    pub max_refresh_buffer: Duration,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            max_cache_ttl: Duration::from_secs(3600),
            max_refresh_buffer: Duration::from_secs(60),
        }
    }
}

/// Token as stored in the cache.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_buffer_secs: i64,
}

impl CachedToken {
    pub fn issue(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime_secs: i64,
        max_refresh_buffer: Duration,
    ) -> Self {
        let cap = i64::try_from(max_refresh_buffer.as_secs()).unwrap_or(i64::MAX);
        let refresh_buffer_secs =
            (lifetime_secs.saturating_mul(REFRESH_BUFFER_PERCENT) / 100).clamp(0, cap);
        let expires_at = chrono::Duration::try_seconds(lifetime_secs)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_at,
            refresh_buffer_secs,
        }
    }

    /// False once `now` is inside the refresh window.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        chrono::Duration::try_seconds(self.refresh_buffer_secs)
            .and_then(|buffer| self.expires_at.checked_sub_signed(buffer))
            .is_some_and(|refresh_at| now < refresh_at)
    }

    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("refresh_buffer_secs", &self.refresh_buffer_secs)
            .finish()
    }
}

/// Exchanges and caches OAuth2 tokens for endpoints.
pub struct TokenManager {
    cache: Arc<dyn TokenCache>,
    client: Client,
    config: OAuth2Config,
}

impl TokenManager {
    pub fn new(cache: Arc<dyn TokenCache>, config: OAuth2Config) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| {
                GatewayError::Configuration(format!("failed to build OAuth2 HTTP client: {}", e))
            })?;

        Ok(Self {
            cache,
            client,
            config,
        })
    }

    pub fn cache_key(endpoint_id: Uuid) -> String {
        format!("oauth2_token:{}", endpoint_id)
    }

    /// The header to attach when delivering to `endpoint`, if it authenticates at all.
    pub async fn resolve_auth_header(
        &self,
        ctx: &RequestContext,
        endpoint: &Endpoint,
    ) -> Result<Option<(String, String)>, GatewayError> {
        match &endpoint.authentication {
            EndpointAuthentication::None => Ok(None),
            EndpointAuthentication::ApiKey {
                header_name,
                header_value,
            } => Ok(Some((header_name.clone(), header_value.clone()))),
            EndpointAuthentication::OAuth2(_) => {
                let value = self.authorization_header(ctx, endpoint).await?;
                Ok(Some(("Authorization".to_string(), value)))
            }
        }
    }

    /// `"<token_type> <access_token>"`, from cache when fresh, otherwise freshly exchanged.
    pub async fn authorization_header(
        &self,
        ctx: &RequestContext,
        endpoint: &Endpoint,
    ) -> Result<String, GatewayError> {
        let config = endpoint.oauth2_config().ok_or_else(|| {
            GatewayError::Configuration(format!(
                "endpoint {} is not configured for OAuth2",
                endpoint.id
            ))
        })?;

        let key = Self::cache_key(endpoint.id);
        if let Some(token) = self.cached_token(ctx, &key, Utc::now()).await? {
            counter!("oauth2_token_cache_hits_total").increment(1);
            debug!(endpoint_id = %endpoint.id, "Using cached OAuth2 token");
            return Ok(token.header_value());
        }

        let (token, lifetime_secs) = match self.exchange(ctx, config).await {
            Ok(exchanged) => {
                counter!("oauth2_token_exchanges_total", "outcome" => "success").increment(1);
                exchanged
            }
            Err(e) => {
                counter!("oauth2_token_exchanges_total", "outcome" => "failure").increment(1);
                warn!(
                    endpoint_id = %endpoint.id,
                    token_url = %config.token_url,
                    error = %e,
                    "OAuth2 token exchange failed"
                );
                return Err(e);
            }
        };

        let ttl = Duration::from_secs(lifetime_secs.unsigned_abs()).min(self.config.max_cache_ttl);
        let value = serde_json::to_string(&token).map_err(|e| {
            GatewayError::Dependency(format!("failed to encode OAuth2 token: {}", e))
        })?;
        ctx.run("cache OAuth2 token", self.cache.set(&key, value, ttl))
            .await?;

        info!(
            endpoint_id = %endpoint.id,
            expires_at = %token.expires_at,
            cache_ttl_secs = ttl.as_secs(),
            "OAuth2 token refreshed"
        );

        Ok(token.header_value())
    }

    /// Drops the cached token so the next request exchanges a new one.
    pub async fn invalidate(
        &self,
        ctx: &RequestContext,
        endpoint_id: Uuid,
    ) -> Result<(), GatewayError> {
        ctx.run(
            "invalidate OAuth2 token",
            self.cache.delete(&Self::cache_key(endpoint_id)),
        )
        .await?;
        debug!(endpoint_id = %endpoint_id, "OAuth2 token invalidated");
        Ok(())
    }

    async fn cached_token(
        &self,
        ctx: &RequestContext,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedToken>, GatewayError> {
        let Some(raw) = ctx.run("read OAuth2 token cache", self.cache.get(key)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<CachedToken>(&raw) {
            Ok(token) if token.is_fresh_at(now) => Ok(Some(token)),
            Ok(_) => {
                debug!(key, "Cached OAuth2 token is due for refresh");
                Ok(None)
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding malformed cached OAuth2 token");
                Ok(None)
            }
        }
    }

    async fn exchange(
        &self,
        ctx: &RequestContext,
        config: &EndpointOAuth2Config,
    ) -> Result<(CachedToken, i64), GatewayError> {
        // Signing keys are loaded before any network traffic.
        let form = token_request_form(config)?;

        let request = self
            .client
            .post(&config.token_url)
            .header(ACCEPT, "application/json")
            .form(&form);

        let issued_at = Utc::now();
        let response = ctx
            .run("OAuth2 token request", async move {
                request.send().await.map_err(|e| {
                    if e.is_timeout() {
                        GatewayError::Timeout(format!("OAuth2 token request: {}", e))
                    } else {
                        GatewayError::AuthExchange(format!("token request failed: {}", e))
                    }
                })
            })
            .await?;

        let status = response.status();
        let body = ctx
            .run("read OAuth2 token response", async move {
                response.text().await.map_err(|e| {
                    GatewayError::AuthExchange(format!("failed to read token response: {}", e))
                })
            })
            .await?;

        if !status.is_success() {
            return Err(GatewayError::AuthExchange(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        parse_token_response(
            &body,
            &config.field_mapping,
            config.expiry_time_unit,
            issued_at,
            &self.config,
        )
    }
}

/// Form body for a client-credentials grant.
fn token_request_form(
    config: &EndpointOAuth2Config,
) -> Result<Vec<(&'static str, String)>, GatewayError> {
    let mut form = vec![
        ("grant_type", "client_credentials".to_string()),
        ("client_id", config.client_id.clone()),
    ];

    match &config.grant {
        OAuth2Grant::SharedSecret { client_secret } => {
            form.push(("client_secret", client_secret.clone()));
        }
        OAuth2Grant::ClientAssertion {
            signing_key,
            signing_algorithm,
            issuer,
            subject,
        } => {
            let signer = AssertionSigner::from_jwk_str(signing_key, signing_algorithm)?;
            let (assertion, _) = signer.sign_assertion(issuer, subject, &config.token_url)?;
            form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
            form.push(("client_assertion", assertion));
        }
    }

    if let Some(scope) = config.scope.as_ref().filter(|s| !s.is_empty()) {
        form.push(("scope", scope.clone()));
    }
    if let Some(audience) = config.audience.as_ref().filter(|s| !s.is_empty()) {
        form.push(("audience", audience.clone()));
    }

    Ok(form)
}

/// Reads a token response through the endpoint's field mapping.
///
/// Returns the token and its lifetime in seconds.
fn parse_token_response(
    body: &str,
    mapping: &OAuth2FieldMapping,
    unit: ExpiryTimeUnit,
    issued_at: DateTime<Utc>,
    limits: &OAuth2Config,
) -> Result<(CachedToken, i64), GatewayError> {
    let fields: serde_json::Map<String, Value> = serde_json::from_str(body).map_err(|e| {
        GatewayError::AuthExchange(format!("token response is not a JSON object: {}", e))
    })?;

    let access_token = fields
        .get(&mapping.access_token)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            GatewayError::AuthExchange(format!(
                "token response has no '{}' field",
                mapping.access_token
            ))
        })?;

    let token_type = fields
        .get(&mapping.token_type)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Bearer");

    // Never longer than the cache TTL.
    let max_lifetime = i64::try_from(limits.max_cache_ttl.as_secs()).unwrap_or(i64::MAX);
    let lifetime_secs = lifetime_seconds(fields.get(&mapping.expires_in), unit)?.min(max_lifetime);

    let token = CachedToken::issue(
        access_token,
        token_type,
        issued_at,
        lifetime_secs,
        limits.max_refresh_buffer,
    );
    Ok((token, lifetime_secs))
}

/// `expires_in` may be a number or a numeric string, in the endpoint's unit.
fn lifetime_seconds(value: Option<&Value>, unit: ExpiryTimeUnit) -> Result<i64, GatewayError> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_EXPIRES_IN_SECS),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    let raw = raw.filter(|v| v.is_finite()).ok_or_else(|| {
        GatewayError::AuthExchange(format!(
            "unparseable expires_in value: {}",
            value.map(Value::to_string).unwrap_or_default()
        ))
    })?;

    let seconds = unit.to_seconds(raw);
    if seconds <= 0 {
        return Err(GatewayError::AuthExchange(format!(
            "token lifetime must be positive, got {} seconds",
            seconds
        )));
    }
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use shared::jwt::Jwk;

    const MAX_BUFFER: Duration = Duration::from_secs(60);

    fn shared_secret_config() -> EndpointOAuth2Config {
        EndpointOAuth2Config {
            token_url: "https://auth.example.com/token".into(),
            client_id: "client-1".into(),
            grant: OAuth2Grant::SharedSecret {
                client_secret: "s3cret".into(),
            },
            scope: Some("webhooks".into()),
            audience: None,
            field_mapping: OAuth2FieldMapping::default(),
            expiry_time_unit: ExpiryTimeUnit::Seconds,
        }
    }

    #[test]
    fn test_long_lived_token_refreshes_one_minute_early() {
        let now = Utc::now();
        let token = CachedToken::issue("t", "Bearer", now, 10 * 3600, MAX_BUFFER);

        assert_eq!(token.refresh_buffer_secs, 60);
        assert!(token.is_fresh_at(now + ChronoDuration::minutes(9 * 60 + 58)));
        assert!(!token.is_fresh_at(now + ChronoDuration::minutes(9 * 60 + 59)));
    }

    #[test]
    fn test_short_lived_token_uses_ten_percent_buffer() {
        let now = Utc::now();
        let token = CachedToken::issue("t", "Bearer", now, 300, MAX_BUFFER);

        assert_eq!(token.refresh_buffer_secs, 30);
        assert!(token.is_fresh_at(now + ChronoDuration::seconds(269)));
        assert!(!token.is_fresh_at(now + ChronoDuration::seconds(270)));
        assert!(!token.is_fresh_at(now + ChronoDuration::seconds(271)));
    }

    #[test]
    fn test_header_value_and_debug() {
        let token = CachedToken::issue("abc", "Bearer", Utc::now(), 60, MAX_BUFFER);
        assert_eq!(token.header_value(), "Bearer abc");
        assert!(!format!("{:?}", token).contains("abc"));
    }

    #[test]
    fn test_parse_standard_response() {
        let now = Utc::now();
        let (token, lifetime) = parse_token_response(
            r#"{"access_token":"tok","token_type":"Bearer","expires_in":1800}"#,
            &OAuth2FieldMapping::default(),
            ExpiryTimeUnit::Seconds,
            now,
            &OAuth2Config::default(),
        )
        .unwrap();

        assert_eq!(lifetime, 1800);
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.expires_at, now + ChronoDuration::seconds(1800));
    }

    #[test]
    fn test_parse_custom_mapping_and_string_expiry() {
        let mapping = OAuth2FieldMapping {
            access_token: "accessToken".into(),
            token_type: "tokenType".into(),
            expires_in: "validFor".into(),
        };
        let (token, lifetime) = parse_token_response(
            r#"{"accessToken":"tok","tokenType":"MAC","validFor":"30"}"#,
            &mapping,
            ExpiryTimeUnit::Minutes,
            Utc::now(),
            &OAuth2Config::default(),
        )
        .unwrap();

        assert_eq!(lifetime, 1800);
        assert_eq!(token.header_value(), "MAC tok");
    }

    #[test]
    fn test_parse_milliseconds_unit() {
        let (_, lifetime) = parse_token_response(
            r#"{"access_token":"tok","expires_in":120000}"#,
            &OAuth2FieldMapping::default(),
            ExpiryTimeUnit::Milliseconds,
            Utc::now(),
            &OAuth2Config::default(),
        )
        .unwrap();
        assert_eq!(lifetime, 120);
    }

    #[test]
    fn test_parse_caps_huge_expiry_at_cache_ttl() {
        let now = Utc::now();
        for (body, unit) in [
            (r#"{"access_token":"tok","expires_in":10000000000000}"#, ExpiryTimeUnit::Seconds),
            (r#"{"access_token":"tok","expires_in":1e17}"#, ExpiryTimeUnit::Seconds),
            (r#"{"access_token":"tok","expires_in":1e19}"#, ExpiryTimeUnit::Hours),
            (r#"{"access_token":"tok","expires_in":"9e300"}"#, ExpiryTimeUnit::Minutes),
        ] {
            let (token, lifetime) = parse_token_response(
                body,
                &OAuth2FieldMapping::default(),
                unit,
                now,
                &OAuth2Config::default(),
            )
            .unwrap();

            assert_eq!(lifetime, 3600, "{}", body);
            assert_eq!(token.expires_at, now + ChronoDuration::seconds(3600));
            assert_eq!(token.refresh_buffer_secs, 60);
        }
    }

    #[test]
    fn test_issue_saturates_instead_of_overflowing() {
        let now = Utc::now();
        let token = CachedToken::issue("t", "Bearer", now, i64::MAX, MAX_BUFFER);

        assert_eq!(token.refresh_buffer_secs, 60);
        assert_eq!(token.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(token.is_fresh_at(now));
    }

    #[test]
    fn test_sub_second_millisecond_expiry_rounds_up() {
        let (_, lifetime) = parse_token_response(
            r#"{"access_token":"tok","expires_in":500}"#,
            &OAuth2FieldMapping::default(),
            ExpiryTimeUnit::Milliseconds,
            Utc::now(),
            &OAuth2Config::default(),
        )
        .unwrap();
        assert_eq!(lifetime, 1);
    }

    #[test]
    fn test_parse_defaults_missing_expiry_and_type() {
        let (token, lifetime) = parse_token_response(
            r#"{"access_token":"tok"}"#,
            &OAuth2FieldMapping::default(),
            ExpiryTimeUnit::Hours,
            Utc::now(),
            &OAuth2Config::default(),
        )
        .unwrap();
        assert_eq!(lifetime, DEFAULT_EXPIRES_IN_SECS);
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn test_parse_rejects_bad_responses() {
        let mapping = OAuth2FieldMapping::default();
        for body in [
            "not json",
            r#"{"token_type":"Bearer"}"#,
            r#"{"access_token":""}"#,
            r#"{"access_token":"tok","expires_in":"soon"}"#,
            r#"{"access_token":"tok","expires_in":0}"#,
            r#"{"access_token":"tok","expires_in":true}"#,
        ] {
            let result =
                parse_token_response(
                body,
                &mapping,
                ExpiryTimeUnit::Seconds,
                Utc::now(),
                &OAuth2Config::default(),
            );
            assert!(
                matches!(result, Err(GatewayError::AuthExchange(_))),
                "body {} should be rejected",
                body
            );
        }
    }

    #[test]
    fn test_shared_secret_form() {
        let form = token_request_form(&shared_secret_config()).unwrap();
        assert!(form.contains(&("grant_type", "client_credentials".to_string())));
        assert!(form.contains(&("client_id", "client-1".to_string())));
        assert!(form.contains(&("client_secret", "s3cret".to_string())));
        assert!(form.contains(&("scope", "webhooks".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "audience"));
    }

    #[test]
    fn test_hmac_assertion_rejected_while_building_form() {
        let mut config = shared_secret_config();
        config.grant = OAuth2Grant::ClientAssertion {
            signing_key: Jwk {
                kty: "oct".into(),
                ..Default::default()
            },
            signing_algorithm: "HS256".into(),
            issuer: "iss".into(),
            subject: "sub".into(),
        };

        let err = token_request_form(&config).unwrap_err();
        assert!(matches!(err, GatewayError::AuthExchange(_)));
        assert!(err.to_string().contains("HS256"));
    }
}
