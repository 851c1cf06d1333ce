//! Bounded fixed-delay polling.
//!
//! A probe either returns a value, or fails with
//! [`DeployError::NotReady`] to ask for another attempt. Any other error
//! ends the poll immediately. Attempts are strictly sequential.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt budget for one logical probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed delay between attempts (seconds).
    pub delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay_secs: 30, // control plane converges in minutes, not seconds
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_secs: u64) -> Self {
        Self {
            max_attempts,
            delay_secs,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Worst-case wall time spent sleeping.
    pub fn budget(&self) -> Duration {
        self.delay() * self.max_attempts.saturating_sub(1)
    }
}

/// Outcome of a poll that did not hit a hard error.
#[derive(Debug, PartialEq, Eq)]
pub enum Polled<T> {
    Ready { value: T, attempts: u32 },
    /// Every attempt reported "not ready". `last` is the final detail.
    Exhausted { attempts: u32, last: String },
}

impl<T> Polled<T> {
    /// Exhaustion becomes [`DeployError::ProvisioningTimeout`].
    pub fn into_result(self, operation: &str) -> Result<T, DeployError> {
        match self {
            Polled::Ready { value, .. } => Ok(value),
            Polled::Exhausted { attempts, last } => Err(DeployError::ProvisioningTimeout {
                operation: operation.to_string(),
                attempts,
                last_response: last,
            }),
        }
    }

    /// Exhaustion becomes `None`.
    pub fn ready(self) -> Option<T> {
        match self {
            Polled::Ready { value, .. } => Some(value),
            Polled::Exhausted { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Polled::Ready { attempts, .. } | Polled::Exhausted { attempts, .. } => *attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPoller {
    policy: RetryPolicy,
}

impl RetryPoller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Invoke `probe` until it succeeds, fails hard, or the budget runs out.
    ///
    /// The probe receives the 1-based attempt number.
    pub async fn poll<T, F, Fut>(&self, operation: &str, mut probe: F) -> Result<Polled<T>, DeployError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DeployError>>,
    {
        let max = self.policy.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=max {
            match probe(attempt).await {
                Ok(value) => {
                    debug!(operation, attempt, "converged");
                    return Ok(Polled::Ready {
                        value,
                        attempts: attempt,
                    });
                }
                Err(DeployError::NotReady(detail)) => last = detail,
                Err(e) => return Err(e),
            }

            if attempt < max {
                warn!(
                    operation,
                    attempt,
                    max,
                    "not ready, retrying in {}s",
                    self.policy.delay_secs
                );
                tokio::time::sleep(self.policy.delay()).await;
            }
        }

        Ok(Polled::Exhausted {
            attempts: max,
            last,
        })
    }
}
