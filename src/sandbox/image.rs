//! Declarative description of a sandbox's runtime environment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::overlay::EnvironmentOverlay;

/// Python runtimes a sandbox image can be based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RuntimeVersion {
    #[serde(rename = "3.10")]
    Py310,
    #[serde(rename = "3.11")]
    Py311,
    #[default]
    #[serde(rename = "3.12")]
    Py312,
    #[serde(rename = "3.13")]
    Py313,
}

impl RuntimeVersion {
    /// Every supported runtime, oldest first.
    pub const ALL: [RuntimeVersion; 4] = [
        RuntimeVersion::Py310,
        RuntimeVersion::Py311,
        RuntimeVersion::Py312,
        RuntimeVersion::Py313,
    ];

    /// Version string as used in image tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeVersion::Py310 => "3.10",
            RuntimeVersion::Py311 => "3.11",
            RuntimeVersion::Py312 => "3.12",
            RuntimeVersion::Py313 => "3.13",
        }
    }

    /// Parses a supported version string.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|v| v.as_str() == value)
    }

    /// Parses `value`, falling back to the default runtime for anything
    /// unsupported.
    pub fn parse_or_default(value: &str) -> Self {
        match Self::parse(value) {
            Some(version) => version,
            None => {
                tracing::warn!(
                    requested = %value,
                    fallback = %Self::default(),
                    "unsupported runtime version, using default"
                );
                Self::default()
            }
        }
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specification of a sandbox image. Building one touches no live resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Python runtime of the base image.
    pub runtime_version: RuntimeVersion,
    /// Shell steps run, in order, while the image is built.
    pub setup_commands: Vec<String>,
    /// Working directory for every command run in the sandbox.
    pub workdir: String,
    /// Variables injected into the sandbox environment.
    pub overlay: EnvironmentOverlay,
}

impl ImageDescriptor {
    /// Builds the descriptor for a workspace pre-seeded with a git checkout.
    ///
    /// Deterministic: the same inputs always produce an equal descriptor.
    /// Reachability of `repo_url` is not checked here.
    pub fn build(
        runtime_version: RuntimeVersion,
        repo_url: &str,
        workdir: &str,
        branch: Option<&str>,
        overlay: EnvironmentOverlay,
    ) -> Self {
        let clone = match branch.filter(|b| !b.is_empty()) {
            Some(branch) => format!(
                "git clone -b {} {} {}",
                shell_quote(branch),
                shell_quote(repo_url),
                shell_quote(workdir)
            ),
            None => format!("git clone {} {}", shell_quote(repo_url), shell_quote(workdir)),
        };

        Self {
            runtime_version,
            setup_commands: vec![
                "apt-get update && apt-get install -y git".to_string(),
                clone,
            ],
            workdir: workdir.to_string(),
            overlay,
        }
    }

    /// Base image the setup commands are applied to.
    pub fn base_image(&self) -> String {
        format!("python:{}-slim", self.runtime_version)
    }
}

/// Quotes `value` as a single POSIX shell word.
pub(crate) fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@=+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
