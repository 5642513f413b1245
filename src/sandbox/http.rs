//! Provider backed by a remote sandbox service's REST API.
//!
//! Wire protocol:
//!
//! - `POST   {base}/sandboxes` with the image description, answers `{"id": ...}`
//! - `POST   {base}/sandboxes/{id}/exec` with `{"command", "language", "timeout"}`,
//!   answers `{"exit_code", "result"}`; `408` means the command timed out
//! - `DELETE {base}/sandboxes/{id}`; `404` counts as already deleted

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::SandboxConfig;
use crate::error::{Error, Result};

use super::image::ImageDescriptor;
use super::provider::{Provider, ProviderError, RunOutput, Sandbox, SandboxCommand};

/// Upper bound on a single create call; image builds clone a repository.
const CREATE_TIMEOUT: Duration = Duration::from_secs(600);

/// Upper bound on a single delete call.
const DELETE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct CreateSandboxRequest<'a> {
    image: String,
    runtime_version: &'a str,
    setup_commands: &'a [String],
    workdir: &'a str,
    env: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CreateSandboxResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct ExecRequest<'a> {
    command: &'a str,
    language: &'a str,
    timeout: u64,
}

#[derive(Debug, Deserialize)]
struct ExecResponse {
    exit_code: i64,
    #[serde(default)]
    result: Option<String>,
}

/// HTTP client for a remote sandbox service.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_grace: Duration,
}

impl HttpProvider {
    /// Creates a provider for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout_grace: Duration::from_secs(5),
        }
    }

    /// Creates a provider from the service settings in `config`.
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let url = config.provider_url.as_deref().ok_or_else(|| {
            Error::Config("provider_url is required (set SANDBOX_API_URL)".to_string())
        })?;

        let mut provider = Self::new(url).with_timeout_grace(config.timeout_grace());
        if let Some(key) = &config.api_key {
            provider = provider.with_api_key(key.clone());
        }
        Ok(provider)
    }

    /// Authenticates every request with a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Extra time granted to the service beyond a command's own timeout
    /// before the client gives up on the response.
    pub fn with_timeout_grace(mut self, grace: Duration) -> Self {
        self.timeout_grace = grace;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Turns a non-success response into an opaque provider error.
    async fn failure(action: &str, response: Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ProviderError::Failed(format!("{} failed with {}: {}", action, status, body.trim()))
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn create(&self, image: &ImageDescriptor) -> std::result::Result<Sandbox, ProviderError> {
        let body = CreateSandboxRequest {
            image: image.base_image(),
            runtime_version: image.runtime_version.as_str(),
            setup_commands: &image.setup_commands,
            workdir: &image.workdir,
            env: image.overlay.vars(),
        };

        let response = self
            .request(Method::POST, "sandboxes")
            .timeout(CREATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::failed)?;

        if !response.status().is_success() {
            return Err(Self::failure("create sandbox", response).await);
        }

        let created: CreateSandboxResponse =
            response.json().await.map_err(ProviderError::failed)?;
        Ok(Sandbox::ready(created.id))
    }

    async fn run(
        &self,
        sandbox: &Sandbox,
        command: &SandboxCommand,
        timeout: Duration,
    ) -> std::result::Result<RunOutput, ProviderError> {
        let body = ExecRequest {
            command: command.body(),
            language: command.language(),
            timeout: timeout.as_secs(),
        };

        let response = self
            .request(Method::POST, &format!("sandboxes/{}/exec", sandbox.id()))
            .timeout(timeout.saturating_add(self.timeout_grace))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::TimedOut { after: timeout }
                } else {
                    ProviderError::failed(e)
                }
            })?;

        if response.status() == StatusCode::REQUEST_TIMEOUT {
            return Err(ProviderError::TimedOut { after: timeout });
        }
        if !response.status().is_success() {
            return Err(Self::failure("exec", response).await);
        }

        let exec: ExecResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::TimedOut { after: timeout }
            } else {
                ProviderError::failed(e)
            }
        })?;
        Ok(RunOutput {
            exit_code: exec.exit_code,
            output: exec.result.unwrap_or_default(),
        })
    }

    async fn delete(&self, sandbox: &Sandbox) -> std::result::Result<(), ProviderError> {
        let response = self
            .request(Method::DELETE, &format!("sandboxes/{}", sandbox.id()))
            .timeout(DELETE_TIMEOUT)
            .send()
            .await
            .map_err(ProviderError::failed)?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(sandbox_id = %sandbox.id(), "sandbox already gone");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::failure("delete sandbox", response).await);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
