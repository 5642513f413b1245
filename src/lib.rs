//! MRE Sandbox - single-use remote sandboxes for reproducing bug reports
//!
//! This library runs untrusted Python snippets in disposable remote sandboxes.
//! Each request gets its own sandbox, provisioned from a declarative image,
//! bounded by a hard timeout, and torn down on every exit path. The outcome is
//! always a structured [`ExecutionResult`] that separates "the code failed"
//! from "the environment failed".

pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod overlay;
pub mod request;
pub mod result;
pub mod sandbox;

pub use backoff::{ExponentialBackoff, RetryPolicy};
pub use config::{SandboxConfig, Validate, ValidationResult};
pub use error::{Error, Result};
pub use executor::{Executor, Stage};
pub use overlay::{EnvironmentOverlay, DEFAULT_ENV_PREFIX};
pub use request::{ExecutionRequest, INTERACTIVE_MARKER};
pub use result::{ExecutionResult, Outcome};
pub use sandbox::{
    CleanupManager, CleanupReport, HttpProvider, ImageDescriptor, Provider, ProviderError,
    RunOutput, RuntimeVersion, Sandbox, SandboxCommand, SandboxState,
};
