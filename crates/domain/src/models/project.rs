//! Project domain model and retry policy.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GatewayError;

/// Upper bound on any computed backoff delay (24 hours).
pub const MAX_BACKOFF_SECS: u64 = 24 * 60 * 60;

/// Backoff strategy between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Linear,
    Exponential,
}

impl RetryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStrategy::Linear => "linear",
            RetryStrategy::Exponential => "exponential",
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryStrategy {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" | "default" => Ok(RetryStrategy::Linear),
            "exponential" | "exponential-backoff" => Ok(RetryStrategy::Exponential),
            other => Err(GatewayError::Validation(format!(
                "unknown retry strategy '{}'",
                other
            ))),
        }
    }
}

/// Retry settings as stored on the project; `strategy` is free text until validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRetrySettings {
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// Interval in seconds.
    #[serde(default)]
    pub duration: u64,
}

/// Validated retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    pub retry_count: u32,
    pub interval_seconds: u64,
}

impl RetryConfig {
    /// Delay before attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = match self.strategy {
            RetryStrategy::Linear => self.interval_seconds,
            RetryStrategy::Exponential => {
                let exponent = attempt.saturating_sub(1).min(32);
                self.interval_seconds.saturating_mul(1u64 << exponent)
            }
        };
        Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
    }

    pub fn is_exhausted(&self, num_trials: u32) -> bool {
        num_trials >= self.retry_count
    }
}

impl TryFrom<&ProjectRetrySettings> for RetryConfig {
    type Error = GatewayError;

    fn try_from(settings: &ProjectRetrySettings) -> Result<Self, Self::Error> {
        let strategy = settings
            .strategy
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::Validation("project retry strategy is not configured".into())
            })?
            .parse()?;

        Ok(RetryConfig {
            strategy,
            retry_count: settings.retry_count,
            interval_seconds: settings.duration,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub retry: ProjectRetrySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub config: ProjectConfig,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, retry: ProjectRetrySettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            config: ProjectConfig { retry },
            created_at: Utc::now(),
        }
    }

    /// The validated retry policy; missing or unknown strategies are rejected.
    pub fn retry_config(&self) -> Result<RetryConfig, GatewayError> {
        RetryConfig::try_from(&self.config.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(strategy: Option<&str>) -> ProjectRetrySettings {
        ProjectRetrySettings {
            strategy: strategy.map(String::from),
            retry_count: 5,
            duration: 10,
        }
    }

    #[test]
    fn test_retry_config_parses_strategy() {
        let project = Project::new("p", settings(Some("Exponential")));
        let config = project.retry_config().unwrap();
        assert_eq!(config.strategy, RetryStrategy::Exponential);
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.interval_seconds, 10);
    }

    #[test]
    fn test_missing_strategy_is_validation_error() {
        let project = Project::new("p", settings(None));
        assert!(matches!(project.retry_config(), Err(GatewayError::Validation(_))));

        let project = Project::new("p", settings(Some("  ")));
        assert!(matches!(project.retry_config(), Err(GatewayError::Validation(_))));
    }

    #[test]
    fn test_unknown_strategy_is_validation_error() {
        let project = Project::new("p", settings(Some("fibonacci")));
        let err = project.retry_config().unwrap_err();
        assert!(err.to_string().contains("fibonacci"));
    }

    #[test]
    fn test_linear_delay_is_constant() {
        let config = RetryConfig {
            strategy: RetryStrategy::Linear,
            retry_count: 3,
            interval_seconds: 30,
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(7), Duration::from_secs(30));
    }

    #[test]
    fn test_exponential_delay_doubles_and_caps() {
        let config = RetryConfig {
            strategy: RetryStrategy::Exponential,
            retry_count: 10,
            interval_seconds: 10,
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(20));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(80));
        assert_eq!(
            config.delay_for_attempt(40),
            Duration::from_secs(MAX_BACKOFF_SECS)
        );
    }

    #[test]
    fn test_is_exhausted() {
        let config = RetryConfig {
            strategy: RetryStrategy::Linear,
            retry_count: 3,
            interval_seconds: 1,
        };
        assert!(!config.is_exhausted(2));
        assert!(config.is_exhausted(3));
    }
}
