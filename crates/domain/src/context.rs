//! Per-request cancellation and deadline propagation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

/// Carries cancellation and an optional deadline through every gateway call.
///
/// Guarded futures are dropped on cancellation, which aborts outbound I/O.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derives a context cancelled together with this one, keeping the earlier deadline.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with `Timeout` if the context is already done.
    pub fn check(&self, operation: &str) -> Result<(), GatewayError> {
        if self.is_cancelled() {
            return Err(GatewayError::Timeout(format!("{} cancelled", operation)));
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(GatewayError::Timeout(format!(
                "{} exceeded its deadline",
                operation
            )));
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the context is cancelled, or the deadline passes.
    pub async fn run<F, T, E>(&self, operation: &str, fut: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<GatewayError>,
    {
        self.check(operation)?;

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(GatewayError::Timeout(format!("{} cancelled", operation)))
            }
            _ = expired => {
                Err(GatewayError::Timeout(format!("{} exceeded its deadline", operation)))
            }
            result = fut => result.map_err(Into::into),
        }
    }
}
