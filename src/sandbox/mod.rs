//! Remote sandbox capability.
//!
//! This module provides the [`Provider`] trait for driving disposable remote
//! sandboxes, the [`ImageDescriptor`] they are built from, the
//! [`CleanupManager`] that tears them down, and the REST-backed
//! [`HttpProvider`].

mod cleanup;
mod http;
mod image;
mod provider;

pub use cleanup::{CleanupManager, CleanupReport};
pub use http::HttpProvider;
pub use image::{ImageDescriptor, RuntimeVersion};
pub(crate) use image::shell_quote;
pub use provider::{Provider, ProviderError, RunOutput, Sandbox, SandboxCommand, SandboxState};
