//! MRE Sandbox CLI
//!
//! Runs one Python snippet in a fresh remote sandbox and prints the
//! execution result as JSON.

use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use mre_sandbox::{
    EnvironmentOverlay, Error, ExecutionRequest, Executor, HttpProvider, Outcome, Result,
    SandboxConfig, Validate,
};

const USAGE: &str = "\
Usage: mre-sandbox <code-file|-> [options]

Runs Python code in a single-use remote sandbox and prints the result as JSON.

Options:
  -p, --package <name==version>  Install a package first (repeatable)
  -t, --timeout <seconds>        Execution timeout (default: 30)
  -e, --env <NAME>               Forward a host variable into the sandbox (repeatable)
  -c, --config <file.toml>       Load settings from a TOML file
  -o, --output <file>            Also write the JSON result to a file

Environment variables:
  SANDBOX_API_URL, SANDBOX_API_KEY       Sandbox service endpoint and credentials
  SANDBOX_REPO_URL, SANDBOX_REPO_PATH    Repository cloned into the sandbox
  SANDBOX_REPO_BRANCH                    Branch to check out
  SANDBOX_PYTHON_VERSION                 3.10, 3.11, 3.12 (default) or 3.13
  SANDBOX_ENV_<NAME>                     Forwarded into the sandbox as <NAME>";

/// Parsed command line.
#[derive(Debug, Default)]
struct Args {
    code_path: Option<String>,
    packages: Vec<String>,
    timeout_seconds: Option<u64>,
    env_names: Vec<String>,
    config_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args::default();
    let mut iter = raw.iter();

    while let Some(arg) = iter.next() {
        let arg = arg.as_str();
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| Error::Config(format!("{} requires a value", flag)))
        };

        match arg {
            "-p" | "--package" => args.packages.push(value(arg)?),
            "-e" | "--env" => args.env_names.push(value(arg)?),
            "-c" | "--config" => args.config_path = Some(PathBuf::from(value(arg)?)),
            "-o" | "--output" => args.output_path = Some(PathBuf::from(value(arg)?)),
            "-t" | "--timeout" => {
                let raw = value(arg)?;
                let secs = raw
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid timeout '{}'", raw)))?;
                args.timeout_seconds = Some(secs);
            }
            flag if flag.starts_with('-') && flag != "-" => {
                return Err(Error::Config(format!("unknown option '{}'", flag)));
            }
            path => {
                if args.code_path.replace(path.to_string()).is_some() {
                    return Err(Error::Config("only one code file may be given".to_string()));
                }
            }
        }
    }

    Ok(args)
}

fn read_code(path: &str) -> Result<String> {
    if path == "-" {
        let mut code = String::new();
        std::io::stdin().read_to_string(&mut code)?;
        return Ok(code);
    }
    Ok(std::fs::read_to_string(path)?)
}

fn load_config(args: &Args) -> Result<SandboxConfig> {
    let base = match &args.config_path {
        Some(path) => SandboxConfig::from_file(path)?,
        None => SandboxConfig::default(),
    };
    let config = base.with_overrides(host_var)?;

    for warning in config.validate().into_result(Error::Config)? {
        tracing::warn!(warning = %warning, "configuration");
    }
    Ok(config)
}

/// Keeps the entries whose name and value are valid Unicode.
fn unicode_vars<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (name, _) => {
                let name = name.unwrap_or_else(|raw| raw.to_string_lossy().into_owned());
                tracing::warn!(name = %name, "skipping host variable that is not valid unicode");
                None
            }
        })
        .collect()
}

fn host_var(name: &str) -> Option<String> {
    match std::env::var_os(name)?.into_string() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(name = %name, "host variable is not valid unicode, ignoring it");
            None
        }
    }
}

/// Variables carrying the configured prefix, plus those named with `--env`.
fn build_overlay(config: &SandboxConfig, names: &[String]) -> EnvironmentOverlay {
    let host = unicode_vars(std::env::vars_os());
    let mut overlay = EnvironmentOverlay::from_prefixed(host, &config.env_prefix);

    let (named, missing) = EnvironmentOverlay::from_allow_list(names, host_var);
    for name in missing {
        tracing::warn!(name = %name, "environment variable not found on host, not forwarded");
    }
    overlay.extend(named);

    if !overlay.is_empty() {
        let names: Vec<&str> = overlay.names().collect();
        tracing::info!(count = overlay.len(), names = ?names, "forwarding environment variables");
    }
    overlay
}

async fn run(args: Args) -> Result<Outcome> {
    let code_path = args
        .code_path
        .as_deref()
        .ok_or_else(|| Error::Config("missing code file".to_string()))?;

    let config = load_config(&args)?;
    let provider = HttpProvider::from_config(&config)?;
    let overlay = build_overlay(&config, &args.env_names);

    let code = read_code(code_path)?;
    let request = ExecutionRequest::new(code, args.packages, args.timeout_seconds.unwrap_or(30));

    let executor = Executor::new(Arc::new(provider), config).with_overlay(overlay);
    let result = executor.execute(&request).await?;

    let json = serde_json::to_string_pretty(&result)?;
    println!("{}", json);
    if let Some(path) = &args.output_path {
        std::fs::write(path, &json)?;
    }

    Ok(result.outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only the JSON result
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.is_empty() || raw.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(Outcome::Succeeded) => ExitCode::SUCCESS,
        Ok(outcome) => {
            tracing::info!(outcome = ?outcome, "execution did not succeed");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}
