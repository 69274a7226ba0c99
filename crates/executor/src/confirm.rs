//! Bounded waiting for transaction confirmation.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::{ExecutorError, Result};

/// Status of a submitted signature as reported by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not yet seen, or seen but not confirmed.
    Pending,
    Confirmed,
    /// Landed with an execution error.
    Failed(String),
}

/// How often to poll for a signature and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl ConfirmPolicy {
    pub fn from_millis(poll_interval_ms: u64, max_wait_ms: u64) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_wait: Duration::from_millis(max_wait_ms),
        }
    }

    /// Number of status polls before giving up. Always at least one.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.poll_interval.as_millis().max(1);
        let attempts = self.max_wait.as_millis() / interval;
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

/// Poll `status` until the signature is confirmed, fails, or the policy runs out.
///
/// Transport errors while polling are treated like a pending status: the
/// transaction may still land, so only the deadline ends the wait.
pub async fn wait_for_confirmation<F, Fut>(
    policy: &ConfirmPolicy,
    signature: &str,
    mut status: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SignatureStatus>>,
{
    let attempts = policy.max_attempts();
    for attempt in 1..=attempts {
        match status().await {
            Ok(SignatureStatus::Confirmed) => return Ok(()),
            Ok(SignatureStatus::Failed(reason)) => {
                return Err(ExecutorError::TransactionFailed {
                    signature: signature.to_string(),
                    reason,
                })
            }
            Ok(SignatureStatus::Pending) => {}
            Err(e) => debug!(signature, attempt, error = %e, "signature status poll failed"),
        }
        if attempt < attempts {
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
    Err(ExecutorError::ConfirmationTimeout { attempts })
}
