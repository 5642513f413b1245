//! Sandbox provider trait and types.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::image::ImageDescriptor;

/// Failure reported by a sandbox provider.
///
/// Provider errors are opaque: their text is forwarded verbatim for
/// diagnostics and never interpreted beyond the timeout distinction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The command did not finish within its bound.
    #[error("command timed out after {} seconds", after.as_secs())]
    TimedOut { after: Duration },

    /// Any other provider failure.
    #[error("{0}")]
    Failed(String),
}

impl ProviderError {
    /// Wraps any displayable error as an opaque failure.
    pub fn failed(err: impl fmt::Display) -> Self {
        ProviderError::Failed(err.to_string())
    }
}

/// Lifecycle state of a provisioned sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    /// Creation requested but not confirmed.
    Provisioning,
    /// Created and accepting commands.
    Ready,
    /// Deleted by the provider.
    Destroyed,
    /// Deletion could not be confirmed; the sandbox may be orphaned.
    Unknown,
}

/// Handle to a live remote sandbox.
///
/// Not `Clone`: exactly one owner drives a sandbox through its lifecycle.
#[derive(Debug, PartialEq, Eq)]
pub struct Sandbox {
    id: String,
    state: SandboxState,
}

impl Sandbox {
    /// Handle for a sandbox the provider has just created.
    pub fn ready(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SandboxState::Ready,
        }
    }

    /// Provider-assigned identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SandboxState) {
        self.state = state;
    }
}

/// A command issued inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCommand {
    /// Shell command line, e.g. a dependency install.
    Shell(String),
    /// Python source run by the sandbox's interpreter.
    Python(String),
}

impl SandboxCommand {
    /// The command text.
    pub fn body(&self) -> &str {
        match self {
            SandboxCommand::Shell(body) | SandboxCommand::Python(body) => body,
        }
    }

    /// Language tag used on the wire.
    pub fn language(&self) -> &'static str {
        match self {
            SandboxCommand::Shell(_) => "shell",
            SandboxCommand::Python(_) => "python",
        }
    }
}

/// Output of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Process exit code.
    pub exit_code: i64,
    /// Combined stdout and stderr, as captured by the provider.
    pub output: String,
}

impl RunOutput {
    /// Returns true if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Remote service that creates, drives and deletes sandboxes.
///
/// Calls are awaited one at a time by their caller. None of them retries
/// internally.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provisions a sandbox from `image`.
    async fn create(&self, image: &ImageDescriptor) -> Result<Sandbox, ProviderError>;

    /// Runs `command` in `sandbox`, giving up after `timeout`.
    async fn run(
        &self,
        sandbox: &Sandbox,
        command: &SandboxCommand,
        timeout: Duration,
    ) -> Result<RunOutput, ProviderError>;

    /// Deletes `sandbox` and everything in it.
    async fn delete(&self, sandbox: &Sandbox) -> Result<(), ProviderError>;

    /// Returns the name of this provider.
    fn name(&self) -> &str;
}
