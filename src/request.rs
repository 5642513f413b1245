//! Execution requests submitted by callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sandbox::shell_quote;

/// Source fragment marking code that reads from an interactive prompt.
pub const INTERACTIVE_MARKER: &str = "input(";

/// Code to run in a fresh sandbox, plus what it needs installed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Python source to execute.
    pub code: String,

    /// Requirements installed before the code runs, usually `name==version`.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Bound on the code's own run time.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl ExecutionRequest {
    /// Creates a request.
    pub fn new<I, S>(code: impl Into<String>, packages: I, timeout_seconds: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code: code.into(),
            packages: packages.into_iter().map(Into::into).collect(),
            timeout_seconds,
        }
    }

    /// Bound on the code's run time.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Returns true if the code would block waiting for user input.
    pub fn needs_interaction(&self) -> bool {
        self.code.contains(INTERACTIVE_MARKER)
    }

    /// Single pip invocation installing every package, if there are any.
    pub fn install_command(&self) -> Option<String> {
        if self.packages.is_empty() {
            return None;
        }

        let packages: Vec<String> = self.packages.iter().map(|p| shell_quote(p)).collect();
        Some(format!(
            "pip install --quiet --disable-pip-version-check {}",
            packages.join(" ")
        ))
    }
}
