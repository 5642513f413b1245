//! The structured outcome of one execution request.

use serde::{Deserialize, Serialize};

/// Which path an execution took, so consumers can tell a failing program
/// apart from a failing environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The code ran and exited 0.
    Succeeded,
    /// The code reads interactive input; nothing was provisioned.
    InteractionRequired,
    /// No sandbox could be created.
    ProvisioningFailed,
    /// The sandbox exists but dependencies failed to install; the code never ran.
    InstallFailed,
    /// The code ran and failed.
    ExecutionFailed,
    /// The code exceeded its time bound.
    TimedOut,
    /// The provider errored while installing or running inside a live
    /// sandbox, so nothing is known about the code.
    ProviderFailed,
}

impl Outcome {
    /// Returns true if the result says something about the submitted code.
    pub fn is_conclusive(&self) -> bool {
        matches!(self, Outcome::Succeeded | Outcome::ExecutionFailed)
    }
}

/// Result of an execution request. Produced on every path, even when no
/// code ran.
///
/// When `sandbox_available` is false, `exit_code` is -1 and neither it nor
/// `stdout` describes the submitted code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code of the last step that ran, or -1 when none finished.
    pub exit_code: i64,
    /// Output of the submitted code.
    pub stdout: String,
    /// Error output and diagnostics, including cleanup warnings.
    pub stderr: String,
    /// One-line error summary, best effort.
    pub exception: Option<String>,
    /// The code exceeded its time bound.
    pub timed_out: bool,
    /// The code reads interactive input and was not run.
    pub needs_interaction: bool,
    /// Wall-clock time for the whole request.
    pub execution_time_ms: u64,
    /// False only when the sandbox could not be provisioned.
    pub sandbox_available: bool,
    /// Packages installed before the code ran.
    pub packages_installed: Vec<String>,
    /// Working directory of the sandbox runtime.
    pub environment_ref: String,
    /// Which path the execution took.
    pub outcome: Outcome,
}

impl ExecutionResult {
    /// Result in its initial state: nothing has failed yet.
    pub fn new(environment_ref: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            exception: None,
            timed_out: false,
            needs_interaction: false,
            execution_time_ms: 0,
            sandbox_available: true,
            packages_installed: Vec::new(),
            environment_ref: environment_ref.into(),
            outcome: Outcome::Succeeded,
        }
    }

    /// Appends a diagnostic to `stderr` without touching what is there.
    pub fn append_diagnostic(&mut self, message: &str) {
        if self.stderr.is_empty() {
            self.stderr = message.to_string();
        } else {
            self.stderr = format!("{}\n\n{}", self.stderr, message);
        }
    }
}

/// Best-effort one-line error summary: the last non-empty line of `output`.
///
/// For a Python traceback this is the `ValueError: ...` line. Output that
/// does not end with the exception yields whatever line does come last.
pub fn last_error_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}
