//! Single-use sandbox execution.
//!
//! [`Executor::execute`] drives one request through
//! `Idle -> PreflightChecked -> Provisioned -> DependenciesInstalled -> Executed -> Finalized`.
//! Every failure along the way is folded into the [`ExecutionResult`], and
//! any sandbox that was created is deleted before the result is returned,
//! including when the request future is dropped mid-flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::config::{SandboxConfig, Validate};
use crate::error::{Error, Result};
use crate::overlay::EnvironmentOverlay;
use crate::request::ExecutionRequest;
use crate::result::{last_error_line, ExecutionResult, Outcome};
use crate::sandbox::{
    CleanupManager, CleanupReport, ImageDescriptor, Provider, ProviderError, RunOutput, Sandbox,
    SandboxCommand,
};

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    PreflightChecked,
    Provisioned,
    DependenciesInstalled,
    Executed,
    Finalized,
}

/// Runs untrusted code in disposable sandboxes.
///
/// Holds no per-request state, so one executor can serve concurrent
/// requests; each gets its own sandbox.
pub struct Executor {
    provider: Arc<dyn Provider>,
    config: SandboxConfig,
    overlay: EnvironmentOverlay,
}

impl Executor {
    /// Creates an executor that forwards no host variables.
    pub fn new(provider: Arc<dyn Provider>, config: SandboxConfig) -> Self {
        Self {
            provider,
            config,
            overlay: EnvironmentOverlay::default(),
        }
    }

    /// Sets the variables injected into every sandbox.
    pub fn with_overlay(mut self, overlay: EnvironmentOverlay) -> Self {
        self.overlay = overlay;
        self
    }

    /// Builds the image description for this executor's sandboxes.
    pub fn image(&self) -> ImageDescriptor {
        ImageDescriptor::build(
            self.config.runtime(),
            &self.config.repo_url,
            &self.config.repo_path,
            self.config.repo_branch.as_deref(),
            self.overlay.clone(),
        )
    }

    /// Executes `request` in a fresh sandbox.
    ///
    /// Only a malformed request is an error. Provider outages, failed
    /// installs, crashing code and timeouts are all reported in the result.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let warnings = request.validate().into_result(Error::InvalidRequest)?;
        for warning in &warnings {
            tracing::warn!(warning = %warning, "execution request");
        }

        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("execute", request_id = %request_id);
        Ok(self.run(request).instrument(span).await)
    }

    async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        let start = Instant::now();
        let mut stage = Stage::Idle;
        let mut result = ExecutionResult::new(&self.config.repo_path);

        if request.needs_interaction() {
            result.needs_interaction = true;
            result.outcome = Outcome::InteractionRequired;
            result.stderr = "Code requires user interaction (input() detected)".to_string();
            advance(&mut stage, Stage::Finalized);
            return finish(result, start);
        }
        advance(&mut stage, Stage::PreflightChecked);

        tracing::info!(provider = %self.provider.name(), "creating sandbox");
        let mut sandbox = match self.provider.create(&self.image()).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                let message = e.to_string();
                tracing::error!(error = %self.overlay.redact(&message), "sandbox creation failed");
                result.sandbox_available = false;
                result.exit_code = -1;
                result.outcome = Outcome::ProvisioningFailed;
                result.stderr = format!("Sandbox initialization error: {}", message);
                result.exception = Some(message);
                advance(&mut stage, Stage::Finalized);
                return finish(result, start);
            }
        };
        tracing::info!(sandbox_id = %sandbox.id(), "sandbox created");
        advance(&mut stage, Stage::Provisioned);

        let cleanup = CleanupManager::new(self.config.cleanup).redacting(self.overlay.clone());
        let mut guard = CleanupGuard::arm(&sandbox, self.provider.clone(), cleanup.clone());

        self.install_and_run(request, &sandbox, &mut stage, &mut result)
            .await;

        // From here the spawned task owns the sandbox and runs every attempt,
        // even if this future is dropped.
        guard.disarm();
        let sandbox_id = sandbox.id().to_string();
        let provider = self.provider.clone();
        let task =
            tokio::spawn(async move { cleanup.cleanup(provider.as_ref(), &mut sandbox).await });
        let report = match task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(sandbox_id = %sandbox_id, error = %e, "cleanup task failed");
                CleanupReport {
                    diagnostic: Some(format!(
                        "WARNING: Sandbox cleanup failed for {}: {}",
                        sandbox_id, e
                    )),
                    sandbox_id,
                    destroyed: false,
                    attempts: 0,
                }
            }
        };
        if let Some(diagnostic) = report.diagnostic {
            result.append_diagnostic(&diagnostic);
        }

        advance(&mut stage, Stage::Finalized);
        finish(result, start)
    }

    /// Installs dependencies, then runs the code if they installed.
    async fn install_and_run(
        &self,
        request: &ExecutionRequest,
        sandbox: &Sandbox,
        stage: &mut Stage,
        result: &mut ExecutionResult,
    ) {
        if let Some(install) = request.install_command() {
            let timeout = self.config.install_timeout();
            match self.run_bounded(sandbox, SandboxCommand::Shell(install), timeout).await {
                Ok(output) if output.success() => {
                    result.packages_installed = request.packages.clone();
                }
                Ok(output) => {
                    tracing::warn!(
                        exit_code = output.exit_code,
                        "package installation failed"
                    );
                    result.exit_code = output.exit_code;
                    result.outcome = Outcome::InstallFailed;
                    result.stderr = format!("Package installation failed: {}", output.output);
                    return;
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(
                        error = %self.overlay.redact(&message),
                        "package installation error"
                    );
                    result.exit_code = -1;
                    result.outcome = Outcome::ProviderFailed;
                    result.stderr = format!("Package installation error: {}", message);
                    result.exception = Some(message);
                    return;
                }
            }
        }
        advance(stage, Stage::DependenciesInstalled);

        let code = SandboxCommand::Python(request.code.clone());
        match self.run_bounded(sandbox, code, request.timeout()).await {
            Ok(output) => record_run(result, output),
            Err(ProviderError::TimedOut { .. }) => {
                tracing::warn!(timeout_secs = request.timeout_seconds, "execution timed out");
                result.timed_out = true;
                result.exit_code = -1;
                result.outcome = Outcome::TimedOut;
                result.stderr = format!(
                    "Execution timed out after {} seconds",
                    request.timeout_seconds
                );
            }
            Err(ProviderError::Failed(message)) => {
                tracing::warn!(error = %self.overlay.redact(&message), "code execution error");
                result.exit_code = -1;
                result.outcome = Outcome::ProviderFailed;
                result.stderr = format!("Code execution error: {}", message);
                result.exception = Some(message);
            }
        }
        advance(stage, Stage::Executed);
    }

    /// Runs a command, enforcing `timeout` on the caller side as well in
    /// case the provider ignores its own bound.
    async fn run_bounded(
        &self,
        sandbox: &Sandbox,
        command: SandboxCommand,
        timeout: Duration,
    ) -> std::result::Result<RunOutput, ProviderError> {
        let deadline = timeout.saturating_add(self.config.timeout_grace());
        match tokio::time::timeout(deadline, self.provider.run(sandbox, &command, timeout)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::TimedOut { after: timeout }),
        }
    }
}

/// Records a completed run of the submitted code.
fn record_run(result: &mut ExecutionResult, output: RunOutput) {
    result.exit_code = output.exit_code;
    result.stdout = output.output;

    if output.exit_code == 0 {
        result.outcome = Outcome::Succeeded;
        return;
    }

    result.outcome = Outcome::ExecutionFailed;
    match last_error_line(&result.stdout) {
        Some(line) => {
            result.stderr = result.stdout.clone();
            result.exception = Some(line);
        }
        None => {
            let message = format!("Process exited with code {} and no output", output.exit_code);
            result.stderr = message.clone();
            result.exception = Some(message);
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    let from = *stage;
    tracing::debug!(from = ?from, to = ?next, "stage transition");
    *stage = next;
}

fn finish(mut result: ExecutionResult, start: Instant) -> ExecutionResult {
    result.execution_time_ms = start.elapsed().as_millis() as u64;
    result
}

/// Deletes the sandbox in the background if the request is abandoned
/// before its own cleanup finished.
struct CleanupGuard {
    sandbox_id: Option<String>,
    provider: Arc<dyn Provider>,
    cleanup: CleanupManager,
}

impl CleanupGuard {
    fn arm(sandbox: &Sandbox, provider: Arc<dyn Provider>, cleanup: CleanupManager) -> Self {
        Self {
            sandbox_id: Some(sandbox.id().to_string()),
            provider,
            cleanup,
        }
    }

    fn disarm(&mut self) {
        self.sandbox_id = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(sandbox_id) = self.sandbox_id.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    sandbox_id = %sandbox_id,
                    "execution abandoned, cleaning up sandbox"
                );
                let provider = self.provider.clone();
                let cleanup = self.cleanup.clone();
                handle.spawn(async move {
                    let mut sandbox = Sandbox::ready(sandbox_id);
                    cleanup.cleanup(provider.as_ref(), &mut sandbox).await;
                });
            }
            Err(_) => {
                tracing::error!(
                    sandbox_id = %sandbox_id,
                    "execution abandoned outside a runtime, sandbox may be orphaned"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::backoff::RetryPolicy;

    /// What the scripted provider does for one `run` call.
    enum Script {
        Output(i64, &'static str),
        Error(ProviderError),
        Hang,
    }

    /// In-memory provider with queued responses and call counters.
    #[derive(Default)]
    struct ScriptedProvider {
        create_error: Option<&'static str>,
        delete_error: Option<&'static str>,
        runs: Mutex<VecDeque<Script>>,
        images: Mutex<Vec<ImageDescriptor>>,
        commands: Mutex<Vec<SandboxCommand>>,
        deletes: AtomicU32,
        deleted: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn with_runs(runs: Vec<Script>) -> Self {
            Self {
                runs: Mutex::new(runs.into()),
                ..Default::default()
            }
        }

        fn creates(&self) -> usize {
            self.images.lock().unwrap().len()
        }

        fn commands(&self) -> Vec<SandboxCommand> {
            self.commands.lock().unwrap().clone()
        }

        fn deletes(&self) -> u32 {
            self.deletes.load(Ordering::SeqCst)
        }

        fn deleted_ids(&self) -> Vec<String> {
            let mut ids = self.deleted.lock().unwrap().clone();
            ids.sort();
            ids
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn create(
            &self,
            image: &ImageDescriptor,
        ) -> std::result::Result<Sandbox, ProviderError> {
            if let Some(message) = self.create_error {
                return Err(ProviderError::failed(message));
            }
            let mut images = self.images.lock().unwrap();
            images.push(image.clone());
            Ok(Sandbox::ready(format!("sb-{}", images.len())))
        }

        async fn run(
            &self,
            _sandbox: &Sandbox,
            command: &SandboxCommand,
            _timeout: Duration,
        ) -> std::result::Result<RunOutput, ProviderError> {
            self.commands.lock().unwrap().push(command.clone());
            let script = self.runs.lock().unwrap().pop_front();
            match script {
                Some(Script::Output(exit_code, output)) => Ok(RunOutput {
                    exit_code,
                    output: output.to_string(),
                }),
                Some(Script::Error(e)) => Err(e),
                Some(Script::Hang) => std::future::pending().await,
                None => panic!("unexpected run call: {:?}", command),
            }
        }

        async fn delete(&self, sandbox: &Sandbox) -> std::result::Result<(), ProviderError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.deleted.lock().unwrap().push(sandbox.id().to_string());
            match self.delete_error {
                Some(message) => Err(ProviderError::failed(message)),
                None => Ok(()),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn test_config() -> SandboxConfig {
        SandboxConfig {
            cleanup: RetryPolicy::immediate(3),
            ..Default::default()
        }
    }

    fn executor(provider: &Arc<ScriptedProvider>) -> Executor {
        Executor::new(provider.clone(), test_config())
    }

    fn request(code: &str, packages: Vec<&str>, timeout: u64) -> ExecutionRequest {
        ExecutionRequest::new(code, packages, timeout)
    }

    #[tokio::test]
    async fn hello_world_succeeds() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Output(
            0,
            "Hello, World!\n",
        )]));

        let result = executor(&provider)
            .execute(&request("print('Hello, World!')", vec![], 5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("Hello, World!"));
        assert!(result.exception.is_none());
        assert!(!result.timed_out);
        assert!(result.sandbox_available);
        assert_eq!(result.outcome, Outcome::Succeeded);
        assert_eq!(result.environment_ref, "/workspace/langchain");
        assert_eq!(provider.creates(), 1);
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test]
    async fn raised_exception_is_captured() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Output(
            1,
            "Traceback (most recent call last):\n  File ...\nValueError: Test error",
        )]));

        let result = executor(&provider)
            .execute(&request("raise ValueError('Test error')", vec![], 5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("ValueError"));
        assert_eq!(result.exception.as_deref(), Some("ValueError: Test error"));
        assert!(result.sandbox_available);
        assert_eq!(result.outcome, Outcome::ExecutionFailed);
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test]
    async fn silent_crash_still_reports_an_exception() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Output(137, "")]));

        let result = executor(&provider)
            .execute(&request("import os; os._exit(137)", vec![], 5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 137);
        assert!(!result.stderr.is_empty());
        assert!(result.exception.unwrap().contains("137"));
    }

    #[tokio::test]
    async fn interactive_code_never_provisions() {
        let provider = Arc::new(ScriptedProvider::default());

        let result = executor(&provider)
            .execute(&request("x = input('Enter value: ')", vec![], 5))
            .await
            .unwrap();

        assert!(result.needs_interaction);
        assert!(result.sandbox_available);
        assert!(result.stderr.contains("input() detected"));
        assert_eq!(result.outcome, Outcome::InteractionRequired);
        assert_eq!(provider.creates(), 0);
        assert_eq!(provider.deletes(), 0);
    }

    #[tokio::test]
    async fn provider_timeout_marks_result_timed_out() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Error(
            ProviderError::TimedOut {
                after: Duration::from_secs(2),
            },
        )]));

        let result = executor(&provider)
            .execute(&request("import time; time.sleep(10)", vec![], 2))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stderr, "Execution timed out after 2 seconds");
        assert!(result.sandbox_available);
        assert_eq!(result.outcome, Outcome::TimedOut);
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_catches_unresponsive_provider() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Hang]));

        let result = executor(&provider)
            .execute(&request("while True: pass", vec![], 2))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.exit_code, -1);
        assert!(result.stderr.contains("timed out"));
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test]
    async fn packages_are_installed_before_execution() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![
            Script::Output(0, "Successfully installed pandas-2.1.3"),
            Script::Output(0, "2.1.3\n"),
        ]));

        let result = executor(&provider)
            .execute(&request(
                "import pandas as pd; print(pd.__version__)",
                vec!["pandas==2.1.3"],
                5,
            ))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("2.1.3"));
        assert!(result.exception.is_none());
        assert_eq!(result.packages_installed, vec!["pandas==2.1.3".to_string()]);

        let commands = provider.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[0],
            SandboxCommand::Shell(
                "pip install --quiet --disable-pip-version-check pandas==2.1.3".to_string()
            )
        );
        assert!(matches!(commands[1], SandboxCommand::Python(_)));
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test]
    async fn failed_install_skips_execution() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Output(
            1,
            "ERROR: No matching distribution found for pandas==99.0",
        )]));

        let result = executor(&provider)
            .execute(&request("import pandas", vec!["pandas==99.0"], 5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.starts_with("Package installation failed: "));
        assert!(result.stderr.contains("No matching distribution"));
        assert!(result.packages_installed.is_empty());
        assert!(result.sandbox_available);
        assert_eq!(result.outcome, Outcome::InstallFailed);
        assert!(!result.outcome.is_conclusive());
        assert_eq!(provider.commands().len(), 1);
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test]
    async fn install_provider_error_skips_execution() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Error(
            ProviderError::failed("connection reset"),
        )]));

        let result = executor(&provider)
            .execute(&request("import pandas", vec!["pandas==2.1.3"], 5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stderr, "Package installation error: connection reset");
        assert_eq!(result.exception.as_deref(), Some("connection reset"));
        assert_eq!(result.outcome, Outcome::ProviderFailed);
        assert!(!result.outcome.is_conclusive());
        assert!(result.packages_installed.is_empty());
        assert_eq!(provider.commands().len(), 1);
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test]
    async fn execution_provider_error_is_not_a_timeout() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Error(
            ProviderError::failed("process API returned 500"),
        )]));

        let result = executor(&provider)
            .execute(&request("print(1)", vec![], 5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, -1);
        assert!(!result.timed_out);
        assert_eq!(result.stderr, "Code execution error: process API returned 500");
        assert_eq!(result.outcome, Outcome::ProviderFailed);
        assert!(!result.outcome.is_conclusive());
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test]
    async fn unavailable_provider_reports_sandbox_unavailable() {
        let provider = Arc::new(ScriptedProvider {
            create_error: Some("Sandbox service unavailable"),
            ..Default::default()
        });

        let result = executor(&provider)
            .execute(&request("print('This will not run')", vec!["pandas==2.1.3"], 5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, -1);
        assert!(!result.sandbox_available);
        assert!(result.stderr.contains("Sandbox initialization error"));
        assert!(result
            .exception
            .as_deref()
            .unwrap()
            .contains("Sandbox service unavailable"));
        assert!(result.packages_installed.is_empty());
        assert_eq!(result.outcome, Outcome::ProvisioningFailed);
        assert!(provider.commands().is_empty());
        assert_eq!(provider.deletes(), 0);
    }

    #[tokio::test]
    async fn permanent_delete_failure_only_appends_warning() {
        let provider = Arc::new(ScriptedProvider {
            delete_error: Some("delete rejected"),
            runs: Mutex::new(
                vec![Script::Output(1, "Traceback ...\nKeyError: 'x'")].into(),
            ),
            ..Default::default()
        });

        let result = executor(&provider)
            .execute(&request("{}['x']", vec![], 5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stdout, "Traceback ...\nKeyError: 'x'");
        assert!(result.stderr.starts_with(
            "Traceback ...\nKeyError: 'x'\n\nWARNING: Sandbox cleanup failed for sb-1"
        ));
        assert_eq!(result.exception.as_deref(), Some("KeyError: 'x'"));
        assert_eq!(provider.deletes(), 3);
    }

    #[tokio::test]
    async fn malformed_request_is_an_error() {
        let provider = Arc::new(ScriptedProvider::default());

        let err = executor(&provider)
            .execute(&request("print(1)", vec![], 0))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(provider.creates(), 0);
    }

    #[tokio::test]
    async fn overlay_reaches_the_image() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Output(
            0,
            "test-key-123\n",
        )]));
        let overlay = EnvironmentOverlay::from_prefixed(
            vec![("SANDBOX_ENV_API_KEY", "test-key-123")],
            "SANDBOX_ENV_",
        );

        let result = executor(&provider)
            .with_overlay(overlay)
            .execute(&request(
                "import os; print(os.environ.get('API_KEY', 'not found'))",
                vec![],
                5,
            ))
            .await
            .unwrap();

        assert!(result.stdout.contains("test-key-123"));
        let images = provider.images.lock().unwrap();
        assert_eq!(images[0].overlay.get("API_KEY"), Some("test-key-123"));
    }

    #[tokio::test]
    async fn image_uses_configured_repository() {
        let provider = Arc::new(ScriptedProvider::default());
        let config = SandboxConfig {
            repo_branch: Some("v0.3".to_string()),
            runtime_version: "2.7".to_string(),
            ..test_config()
        };

        let image = Executor::new(provider, config).image();

        assert_eq!(image.runtime_version, crate::sandbox::RuntimeVersion::Py312);
        assert_eq!(image.workdir, "/workspace/langchain");
        assert!(image.setup_commands[1].starts_with("git clone -b v0.3 "));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_request_still_deletes_sandbox() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Hang]));
        let executor = executor(&provider);
        let request = request("import time; time.sleep(600)", vec![], 30);

        let outcome =
            tokio::time::timeout(Duration::from_secs(1), executor.execute(&request)).await;
        assert!(outcome.is_err());

        for _ in 0..10 {
            if provider.deletes() > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_get_separate_sandboxes() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![
            Script::Output(0, "a\n"),
            Script::Output(0, "b\n"),
        ]));
        let executor = executor(&provider);
        let first = request("print('a')", vec![], 5);
        let second = request("print('b')", vec![], 5);

        let (a, b) = tokio::join!(executor.execute(&first), executor.execute(&second));

        assert_eq!(a.unwrap().exit_code, 0);
        assert_eq!(b.unwrap().exit_code, 0);
        assert_eq!(provider.creates(), 2);
        assert_eq!(provider.deleted_ids(), vec!["sb-1", "sb-2"]);
    }

    #[tokio::test]
    async fn huge_timeout_does_not_overflow_the_deadline() {
        let provider = Arc::new(ScriptedProvider::with_runs(vec![Script::Output(0, "1\n")]));

        let result = executor(&provider)
            .execute(&request("print(1)", vec![], u64::MAX))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Succeeded);
        assert_eq!(provider.deletes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoning_during_cleanup_keeps_attempts_bounded() {
        let provider = Arc::new(ScriptedProvider {
            delete_error: Some("delete rejected"),
            runs: Mutex::new(vec![Script::Output(0, "ok\n")].into()),
            ..Default::default()
        });
        let config = SandboxConfig {
            cleanup: RetryPolicy::default(),
            ..test_config()
        };
        let executor = Executor::new(provider.clone(), config);
        let request = request("print('ok')", vec![], 5);

        // First delete fails at once; the request is dropped during the 1s backoff.
        let outcome =
            tokio::time::timeout(Duration::from_millis(500), executor.execute(&request)).await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.deletes(), 3);
    }
}
