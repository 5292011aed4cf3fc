//! Endpoint domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::jwt::Jwk;
use uuid::Uuid;

/// Wildcard subscription matching every event type.
pub const WILDCARD_EVENT_TYPE: &str = "*";

/// Endpoint health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Pending,
    Active,
    Paused,
    Inactive,
}

impl EndpointStatus {
    /// Allowed moves: `Pending → Active ⇄ Paused`, `Active → Inactive`, `Inactive → Pending`.
    pub fn can_transition_to(&self, next: EndpointStatus) -> bool {
        use EndpointStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Active, Paused) | (Paused, Active) | (Active, Inactive) | (Inactive, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Pending => "pending",
            EndpointStatus::Active => "active",
            EndpointStatus::Paused => "paused",
            EndpointStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(EndpointStatus::Pending),
            "active" => Ok(EndpointStatus::Active),
            "paused" => Ok(EndpointStatus::Paused),
            "inactive" => Ok(EndpointStatus::Inactive),
            _ => Err(format!("Invalid endpoint status: {}", s)),
        }
    }
}

/// A signing secret; `expires_at` is set once the secret is rotated out.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSecret {
    pub value: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EndpointSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

impl fmt::Debug for EndpointSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointSecret")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Unit the authorization server uses for `expires_in`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryTimeUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
    Milliseconds,
}

impl ExpiryTimeUnit {
    /// Converts a raw `expires_in` value to whole seconds.
    ///
    /// Fractions are dropped, except that a positive sub-second value counts
    /// as one second. Out-of-range values saturate at the `i64` bounds.
    pub fn to_seconds(&self, value: f64) -> i64 {
        let seconds = match self {
            ExpiryTimeUnit::Seconds => value,
            ExpiryTimeUnit::Minutes => value * 60.0,
            ExpiryTimeUnit::Hours => value * 3600.0,
            ExpiryTimeUnit::Milliseconds => value / 1000.0,
        };
        if seconds > 0.0 && seconds < 1.0 {
            return 1;
        }
        seconds.floor() as i64
    }
}

/// Names of the token response fields, for non-standard authorization servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2FieldMapping {
    #[serde(default = "default_access_token_field")]
    pub access_token: String,
    #[serde(default = "default_token_type_field")]
    pub token_type: String,
    #[serde(default = "default_expires_in_field")]
    pub expires_in: String,
}

fn default_access_token_field() -> String {
    "access_token".to_string()
}

fn default_token_type_field() -> String {
    "token_type".to_string()
}

fn default_expires_in_field() -> String {
    "expires_in".to_string()
}

impl Default for OAuth2FieldMapping {
    fn default() -> Self {
        Self {
            access_token: default_access_token_field(),
            token_type: default_token_type_field(),
            expires_in: default_expires_in_field(),
        }
    }
}

/// How the gateway proves its identity to the token endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "authentication_type", rename_all = "snake_case")]
pub enum OAuth2Grant {
    SharedSecret {
        client_secret: String,
    },
    ClientAssertion {
        signing_key: Jwk,
        signing_algorithm: String,
        issuer: String,
        subject: String,
    },
}

impl fmt::Debug for OAuth2Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OAuth2Grant::SharedSecret { .. } => f
                .debug_struct("SharedSecret")
                .field("client_secret", &"[REDACTED]")
                .finish(),
            OAuth2Grant::ClientAssertion {
                signing_key,
                signing_algorithm,
                issuer,
                subject,
            } => f
                .debug_struct("ClientAssertion")
                .field("signing_key", signing_key)
                .field("signing_algorithm", signing_algorithm)
                .field("issuer", issuer)
                .field("subject", subject)
                .finish(),
        }
    }
}

/// Per-endpoint OAuth2 client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub token_url: String,
    pub client_id: String,
    #[serde(flatten)]
    pub grant: OAuth2Grant,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub field_mapping: OAuth2FieldMapping,
    #[serde(default)]
    pub expiry_time_unit: ExpiryTimeUnit,
}

/// Outbound authentication attached to an endpoint.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointAuthentication {
    #[default]
    None,
    ApiKey {
        header_name: String,
        header_value: String,
    },
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Config),
}

impl fmt::Debug for EndpointAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAuthentication::None => f.write_str("None"),
            EndpointAuthentication::ApiKey { header_name, .. } => f
                .debug_struct("ApiKey")
                .field("header_name", header_name)
                .field("header_value", &"[REDACTED]")
                .finish(),
            EndpointAuthentication::OAuth2(config) => f.debug_tuple("OAuth2").field(config).finish(),
        }
    }
}

/// An outbound webhook receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub secrets: Vec<EndpointSecret>,
    #[serde(default)]
    pub authentication: EndpointAuthentication,
    pub status: EndpointStatus,
    #[serde(default)]
    pub event_types: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn new(project_id: Uuid, name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            owner_id: None,
            url: url.into(),
            name: name.into(),
            secrets: Vec::new(),
            authentication: EndpointAuthentication::None,
            status: EndpointStatus::Active,
            event_types: vec![WILDCARD_EVENT_TYPE.to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EndpointStatus::Active
    }

    /// True if subscribed to `event_type` literally or through `*`.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_types
            .iter()
            .any(|t| t == WILDCARD_EVENT_TYPE || t == event_type)
    }

    /// The newest secret that has no expiry set.
    pub fn current_secret(&self) -> Option<&EndpointSecret> {
        self.secrets.iter().rev().find(|s| s.expires_at.is_none())
    }

    pub fn oauth2_config(&self) -> Option<&OAuth2Config> {
        match &self.authentication {
            EndpointAuthentication::OAuth2(config) => Some(config),
            _ => None,
        }
    }
}

/// Secret metadata safe to return to API clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecretSummary {
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// API view of an endpoint; never carries secret values or credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub name: String,
    pub url: String,
    pub status: EndpointStatus,
    pub event_types: Vec<String>,
    pub authentication_type: &'static str,
    pub secrets: Vec<SecretSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Endpoint> for EndpointResponse {
    fn from(endpoint: Endpoint) -> Self {
        let authentication_type = match endpoint.authentication {
            EndpointAuthentication::None => "none",
            EndpointAuthentication::ApiKey { .. } => "api_key",
            EndpointAuthentication::OAuth2(_) => "oauth2",
        };
        Self {
            id: endpoint.id,
            project_id: endpoint.project_id,
            owner_id: endpoint.owner_id,
            name: endpoint.name,
            url: endpoint.url,
            status: endpoint.status,
            event_types: endpoint.event_types,
            authentication_type,
            secrets: endpoint
                .secrets
                .iter()
                .map(|s| SecretSummary {
                    expires_at: s.expires_at,
                    created_at: s.created_at,
                })
                .collect(),
            created_at: endpoint.created_at,
            updated_at: endpoint.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use EndpointStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Inactive));
        assert!(Inactive.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Inactive));
        assert!(!Inactive.can_transition_to(Active));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("ACTIVE".parse::<EndpointStatus>().unwrap(), EndpointStatus::Active);
        assert!("broken".parse::<EndpointStatus>().is_err());
    }

    #[test]
    fn test_subscribes_to() {
        let mut endpoint = Endpoint::new(Uuid::new_v4(), "billing", "https://example.com");
        assert!(endpoint.subscribes_to("anything.at.all"));

        endpoint.event_types = vec!["invoice.paid".to_string()];
        assert!(endpoint.subscribes_to("invoice.paid"));
        assert!(!endpoint.subscribes_to("invoice.created"));
    }

    #[test]
    fn test_current_secret_skips_expiring() {
        let mut endpoint = Endpoint::new(Uuid::new_v4(), "e", "https://example.com");
        let mut old = EndpointSecret::new("old");
        old.expires_at = Some(Utc::now());
        endpoint.secrets = vec![EndpointSecret::new("first"), old];

        assert_eq!(endpoint.current_secret().unwrap().value, "first");
    }

    #[test]
    fn test_expiry_unit_conversion() {
        assert_eq!(ExpiryTimeUnit::Seconds.to_seconds(3600.0), 3600);
        assert_eq!(ExpiryTimeUnit::Minutes.to_seconds(5.0), 300);
        assert_eq!(ExpiryTimeUnit::Hours.to_seconds(2.0), 7200);
        assert_eq!(ExpiryTimeUnit::Milliseconds.to_seconds(90_500.0), 90);
        assert_eq!(ExpiryTimeUnit::Milliseconds.to_seconds(500.0), 1);
        assert_eq!(ExpiryTimeUnit::Milliseconds.to_seconds(0.0), 0);
        assert_eq!(ExpiryTimeUnit::Hours.to_seconds(1e19), i64::MAX);
    }

    #[test]
    fn test_oauth2_authentication_deserialize() {
        let json = serde_json::json!({
            "type": "oauth2",
            "token_url": "https://auth.example.com/token",
            "client_id": "client",
            "authentication_type": "shared_secret",
            "client_secret": "s3cret",
            "field_mapping": { "access_token": "accessToken" }
        });

        let auth: EndpointAuthentication = serde_json::from_value(json).unwrap();
        let EndpointAuthentication::OAuth2(config) = auth else {
            panic!("expected oauth2");
        };
        assert_eq!(config.field_mapping.access_token, "accessToken");
        assert_eq!(config.field_mapping.token_type, "token_type");
        assert_eq!(config.expiry_time_unit, ExpiryTimeUnit::Seconds);
        assert!(matches!(config.grant, OAuth2Grant::SharedSecret { .. }));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let auth = EndpointAuthentication::ApiKey {
            header_name: "X-Key".into(),
            header_value: "hunter2".into(),
        };
        assert!(!format!("{:?}", auth).contains("hunter2"));

        let grant = OAuth2Grant::SharedSecret {
            client_secret: "hunter2".into(),
        };
        assert!(!format!("{:?}", grant).contains("hunter2"));
    }

    #[test]
    fn test_response_hides_secrets() {
        let mut endpoint = Endpoint::new(Uuid::new_v4(), "e", "https://example.com");
        endpoint.secrets = vec![EndpointSecret::new("hunter2-secret")];
        endpoint.authentication = EndpointAuthentication::ApiKey {
            header_name: "X-Key".into(),
            header_value: "hunter2-key".into(),
        };

        let response = EndpointResponse::from(endpoint);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("hunter2"));
        assert_eq!(response.authentication_type, "api_key");
        assert_eq!(response.secrets.len(), 1);
    }
}
