//! Executor configuration and validation.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables. Requests and configs are validated before
//! any sandbox is touched.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::RetryPolicy;
use crate::error::{Error, Result};
use crate::overlay::DEFAULT_ENV_PREFIX;
use crate::request::ExecutionRequest;
use crate::sandbox::RuntimeVersion;

/// Problems found while validating a config or request.
///
/// Errors reject the input outright; warnings are logged and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn reject(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Warnings on success; otherwise every error joined into one `Error`
    /// built by `into_error`.
    pub fn into_result(self, into_error: fn(String) -> Error) -> Result<Vec<String>> {
        if self.errors.is_empty() {
            return Ok(self.warnings);
        }
        Err(into_error(self.errors.join("; ")))
    }
}

/// Inputs checked before any sandbox is touched.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

/// Settings for sandbox provisioning and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Repository cloned into every sandbox.
    #[serde(default = "default_repo_url")]
    pub repo_url: String,

    /// Where the repository is cloned; also the sandbox working directory.
    #[serde(default = "default_repo_path")]
    pub repo_path: String,

    /// Branch to check out, if not the default branch.
    #[serde(default)]
    pub repo_branch: Option<String>,

    /// Requested Python runtime; unsupported values fall back to 3.12.
    #[serde(default = "default_runtime_version")]
    pub runtime_version: String,

    /// Host variables carrying this prefix are forwarded into sandboxes.
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// Bound on the dependency install step, in seconds.
    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,

    /// Extra seconds the caller waits past a command's timeout before
    /// declaring it timed out on its own.
    #[serde(default = "default_timeout_grace_secs")]
    pub timeout_grace_secs: u64,

    /// Retry policy for sandbox teardown.
    #[serde(default)]
    pub cleanup: RetryPolicy,

    /// Base URL of the sandbox service.
    #[serde(default)]
    pub provider_url: Option<String>,

    /// API key for the sandbox service. Never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_repo_url() -> String {
    "https://github.com/langchain-ai/langchain.git".to_string()
}

fn default_repo_path() -> String {
    "/workspace/langchain".to_string()
}

fn default_runtime_version() -> String {
    RuntimeVersion::default().to_string()
}

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_string()
}

fn default_install_timeout_secs() -> u64 {
    120
}

fn default_timeout_grace_secs() -> u64 {
    5
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            repo_url: default_repo_url(),
            repo_path: default_repo_path(),
            repo_branch: None,
            runtime_version: default_runtime_version(),
            env_prefix: default_env_prefix(),
            install_timeout_secs: default_install_timeout_secs(),
            timeout_grace_secs: default_timeout_grace_secs(),
            cleanup: RetryPolicy::default(),
            provider_url: None,
            api_key: None,
        }
    }
}

impl SandboxConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Repository and runtime settings also accept the older unprefixed
    /// names (`LANGCHAIN_REPO_URL`, `LANGCHAIN_REPO_PATH`,
    /// `LANGCHAIN_REPO_BRANCH`, `PYTHON_VERSION`) when the `SANDBOX_` name
    /// is unset.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let either = |name: &str, legacy: &str| lookup(name).or_else(|| lookup(legacy));

        if let Some(url) = either("SANDBOX_REPO_URL", "LANGCHAIN_REPO_URL") {
            self.repo_url = url;
        }
        if let Some(path) = either("SANDBOX_REPO_PATH", "LANGCHAIN_REPO_PATH") {
            self.repo_path = path;
        }
        if let Some(branch) = either("SANDBOX_REPO_BRANCH", "LANGCHAIN_REPO_BRANCH") {
            self.repo_branch = Some(branch).filter(|b| !b.is_empty());
        }
        if let Some(version) = either("SANDBOX_PYTHON_VERSION", "PYTHON_VERSION") {
            self.runtime_version = version;
        }
        if let Some(secs) = lookup("SANDBOX_INSTALL_TIMEOUT") {
            self.install_timeout_secs = secs.trim().parse().map_err(|_| {
                Error::Config(format!("SANDBOX_INSTALL_TIMEOUT must be seconds, got '{}'", secs))
            })?;
        }
        if let Some(url) = lookup("SANDBOX_API_URL") {
            self.provider_url = Some(url);
        }
        if let Some(key) = lookup("SANDBOX_API_KEY") {
            self.api_key = Some(key);
        }
        Ok(self)
    }

    /// Runtime the sandbox image is based on.
    pub fn runtime(&self) -> RuntimeVersion {
        RuntimeVersion::parse_or_default(&self.runtime_version)
    }

    /// Bound on the dependency install step.
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    /// Slack added to command timeouts on the caller side.
    pub fn timeout_grace(&self) -> Duration {
        Duration::from_secs(self.timeout_grace_secs)
    }
}

impl Validate for SandboxConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.repo_url.trim().is_empty() {
            result.reject("repo_url cannot be empty");
        }

        if !self.repo_path.starts_with('/') {
            result.reject(format!("repo_path '{}' must be absolute", self.repo_path));
        }

        // An empty prefix would forward the whole host environment
        if self.env_prefix.is_empty() {
            result.reject("env_prefix cannot be empty");
        }

        if self.install_timeout_secs == 0 {
            result.reject("install_timeout_secs must be positive");
        }

        if RuntimeVersion::parse(&self.runtime_version).is_none() {
            result.warn(format!(
                "runtime_version '{}' is not supported, {} will be used",
                self.runtime_version,
                RuntimeVersion::default()
            ));
        }

        if let Some(url) = &self.provider_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                result.reject(format!("provider_url '{}' must be an http(s) URL", url));
            }
        }

        if self.cleanup.max_attempts == 0 {
            result.warn("cleanup.max_attempts is 0, one attempt will still be made");
        }

        result
    }
}

impl Validate for ExecutionRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.timeout_seconds == 0 {
            result.reject("timeout_seconds must be positive");
        }

        if self.code.trim().is_empty() {
            result.warn("code is empty");
        }

        for package in &self.packages {
            if package.trim().is_empty() {
                result.reject("package entries cannot be empty");
                continue;
            }
            if package.chars().any(|c| c.is_whitespace() || c.is_control()) {
                result.reject(format!(
                    "package '{}' contains whitespace or control characters",
                    package
                ));
                continue;
            }
            if package.starts_with('-') {
                result.reject(format!("package '{}' looks like an installer flag", package));
                continue;
            }
            if !package.contains("==") {
                result.warn(format!("package '{}' is not pinned with ==", package));
            }
        }

        result
    }
}
