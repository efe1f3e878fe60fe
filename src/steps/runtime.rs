//! Runtime setup step - locate an interpreter matching the version specifier

use crate::core::context::JobContext;
use crate::core::error::PipelineError;
use crate::core::state_machine::JobState;
use crate::core::traits::{Step, StepOutcome};
use crate::security::command_executor::CommandError;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use semver::Version;
use std::fmt;

lazy_static! {
    static ref REPORTED_VERSION: Regex =
        Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("valid version pattern");
}

/// Interpreters tried when `runtime.command` is unset
const DEFAULT_CANDIDATES: &[&str] = &["python3", "python"];

/// A version specifier such as `3.x`, `3.11` or `3.11.4`.
///
/// Each given component must match; `x` or `*` matches anything, and
/// missing trailing components are wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpecifier {
    raw: String,
    components: Vec<Option<u64>>,
}

impl VersionSpecifier {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("Version specifier is empty".to_string());
        }

        let mut components = Vec::new();
        for (i, part) in trimmed.split('.').enumerate() {
            match part {
                "x" | "X" | "*" if i > 0 => components.push(None),
                _ => {
                    let value = part.parse::<u64>().map_err(|_| {
                        format!("Invalid version specifier '{}': bad component '{}'", raw, part)
                    })?;
                    components.push(Some(value));
                }
            }
        }

        if components.len() > 3 {
            return Err(format!(
                "Invalid version specifier '{}': too many components",
                raw
            ));
        }

        Ok(Self {
            raw: trimmed.to_string(),
            components,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        let actual = [version.major, version.minor, version.patch];
        self.components
            .iter()
            .zip(actual.iter())
            .all(|(wanted, got)| wanted.is_none_or(|w| w == *got))
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Extract the version from `--version` output (`Python 3.11.4`)
pub fn parse_reported_version(output: &str) -> Option<Version> {
    let caps = REPORTED_VERSION.captures(output)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Finds an interpreter matching `runtime.version`
#[derive(Debug, Default)]
pub struct RuntimeStep {
    _private: (),
}

impl RuntimeStep {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

#[async_trait]
impl Step for RuntimeStep {
    fn name(&self) -> &str {
        "runtime"
    }

    fn state(&self) -> JobState {
        JobState::ProvisioningRuntime
    }

    async fn run(&self, ctx: &mut JobContext) -> Result<StepOutcome, PipelineError> {
        let raw = ctx.config.runtime.version.clone();
        let specifier =
            VersionSpecifier::parse(&raw).map_err(|message| PipelineError::RuntimeSetupFailed {
                specifier: raw.clone(),
                message,
            })?;

        let candidates: Vec<String> = match &ctx.config.runtime.command {
            Some(command) => vec![command.clone()],
            None => DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
        };

        let executor = ctx.executor()?;
        let mut seen = Vec::new();

        for candidate in &candidates {
            let output = match executor.execute(candidate, &["--version"]).await {
                Ok(output) => output,
                Err(CommandError::ExecutionFailed(e)) => {
                    log::debug!("{} unavailable: {}", candidate, e);
                    continue;
                }
                Err(e) => {
                    return Err(PipelineError::RuntimeSetupFailed {
                        specifier: specifier.to_string(),
                        message: e.to_string(),
                    });
                }
            };

            if !output.success {
                continue;
            }

            // Old interpreters print the version on stderr
            let Some(version) = parse_reported_version(&output.combined()) else {
                continue;
            };

            if specifier.matches(&version) {
                ctx.runtime_command = Some(candidate.clone());
                return Ok(StepOutcome::new(format!("{} ({})", version, candidate)));
            }

            seen.push(format!("{} {}", candidate, version));
        }

        let message = if seen.is_empty() {
            format!("no interpreter found (tried {})", candidates.join(", "))
        } else {
            format!("no match among: {}", seen.join(", "))
        };

        Err(PipelineError::RuntimeSetupFailed {
            specifier: specifier.to_string(),
            message,
        })
    }
}
