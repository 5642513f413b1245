//! Retried, best-effort sandbox teardown.

use serde::{Deserialize, Serialize};

use crate::backoff::RetryPolicy;
use crate::overlay::EnvironmentOverlay;

use super::provider::{Provider, Sandbox, SandboxState};

/// What happened when a sandbox was torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Identifier of the sandbox.
    pub sandbox_id: String,
    /// Whether the provider confirmed deletion.
    pub destroyed: bool,
    /// Delete calls issued.
    pub attempts: u32,
    /// Warning to surface to the caller when deletion was not confirmed.
    pub diagnostic: Option<String>,
}

/// Deletes sandboxes with bounded retries and exponential backoff.
///
/// Failure to delete never escalates: it is logged as a possible orphan and
/// reported back as a diagnostic.
#[derive(Debug, Clone, Default)]
pub struct CleanupManager {
    policy: RetryPolicy,
    redactor: EnvironmentOverlay,
}

impl CleanupManager {
    /// Creates a cleanup manager with the given retry policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            redactor: EnvironmentOverlay::default(),
        }
    }

    /// Redacts the overlay's values from logged provider errors.
    pub fn redacting(mut self, overlay: EnvironmentOverlay) -> Self {
        self.redactor = overlay;
        self
    }

    /// Deletes `sandbox`, retrying on failure.
    ///
    /// The sandbox ends in [`SandboxState::Destroyed`] on success and in
    /// [`SandboxState::Unknown`] once every attempt has failed.
    pub async fn cleanup(&self, provider: &dyn Provider, sandbox: &mut Sandbox) -> CleanupReport {
        let max_attempts = self.policy.attempts();
        let mut delays = self.policy.backoff();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            tracing::info!(
                sandbox_id = %sandbox.id(),
                attempt,
                max_attempts,
                "deleting sandbox"
            );

            match provider.delete(sandbox).await {
                Ok(()) => {
                    sandbox.set_state(SandboxState::Destroyed);
                    tracing::info!(sandbox_id = %sandbox.id(), "sandbox deleted");
                    return CleanupReport {
                        sandbox_id: sandbox.id().to_string(),
                        destroyed: true,
                        attempts: attempt,
                        diagnostic: None,
                    };
                }
                Err(e) => {
                    last_error = self.redactor.redact(&e.to_string());
                    tracing::warn!(
                        sandbox_id = %sandbox.id(),
                        attempt,
                        error = %last_error,
                        "sandbox delete attempt failed"
                    );
                    if attempt < max_attempts {
                        if let Some(delay) = delays.next() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        sandbox.set_state(SandboxState::Unknown);
        tracing::error!(
            sandbox_id = %sandbox.id(),
            provider = %provider.name(),
            attempts = max_attempts,
            error = %last_error,
            "failed to clean up sandbox, it may be orphaned"
        );

        CleanupReport {
            sandbox_id: sandbox.id().to_string(),
            destroyed: false,
            attempts: max_attempts,
            diagnostic: Some(format!(
                "WARNING: Sandbox cleanup failed for {} after {} attempts: {}",
                sandbox.id(),
                max_attempts,
                last_error
            )),
        }
    }
}
