//! SafeCommandExecutor: allowlisted execution of the external tools a release needs
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: Only pre-approved commands can execute
//! - **Injection prevention**: Arguments are passed as a vector, never through a shell
//! - **Working directory validation**: Validates existence before execution
//! - **Environment scrubbing**: Named variables are removed from every child
//! - **Output redaction**: Captured stdout/stderr are scrubbed of secrets
//! - **Cancellation**: The child is killed when the returned future is dropped
//!
//! # Example
//!
//! ```rust,no_run
//! use release_publisher::SafeCommandExecutor;
//!
//! # async fn example() -> Result<(), release_publisher::CommandError> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.scrub_env("PYPI_API_TOKEN");
//!
//! let output = executor.execute("git", &["--version"]).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use crate::security::credential::Redactor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Commands the release sequence is allowed to run
const ALLOWED_COMMANDS: &[&str] = &[
    "git", "python", "python3", "py", "pip", "pip3", "twine",
    // versioned interpreters a project may pin as `runtime.command`
    "python3.8", "python3.9", "python3.10", "python3.11", "python3.12", "python3.13",
    "python3.14",
];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command could not be started (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),
}

/// Captured, redacted result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`None` when terminated by a signal)
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
        }
    }

    /// Last `lines` lines of the combined output, for error messages
    pub fn tail(&self, lines: usize) -> String {
        let combined = self.combined();
        let all: Vec<&str> = combined.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Safe command executor with security controls
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    /// Working directory where commands will be executed
    working_dir: PathBuf,
    /// Inherited variables removed before each spawn
    scrubbed_env: Vec<String>,
    /// Scrubs secrets from captured output
    redactor: Redactor,
    allowed_commands: Vec<String>,
}

impl SafeCommandExecutor {
    /// Create a new SafeCommandExecutor with working directory validation.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidWorkingDirectory` if the directory does not exist.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            scrubbed_env: Vec::new(),
            redactor: Redactor::none(),
            allowed_commands: ALLOWED_COMMANDS.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Keep `name` out of the environment children inherit.
    ///
    /// Variables passed explicitly to [`Self::execute_with_env`] still reach
    /// the child.
    pub fn scrub_env(&mut self, name: &str) {
        if !name.is_empty() && !self.scrubbed_env.iter().any(|n| n == name) {
            self.scrubbed_env.push(name.to_string());
        }
    }

    /// Redact captured output with `redactor`
    pub fn set_redactor(&mut self, redactor: Redactor) {
        self.redactor = redactor;
    }

    /// Replace the allowlist
    pub fn with_allowed_commands(mut self, commands: &[&str]) -> Self {
        self.allowed_commands = commands.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Execute a command in the working directory
    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.execute_with_env(command, args, &[]).await
    }

    /// Execute a command with extra environment variables.
    ///
    /// # Errors
    ///
    /// - `CommandError::CommandNotAllowed` - Command not in whitelist
    /// - `CommandError::ExecutionFailed` - Binary not found or execution error
    pub async fn execute_with_env(
        &self,
        command: &str,
        args: &[&str],
        envs: &[(&str, &str)],
    ) -> Result<CommandOutput, CommandError> {
        if !self.is_allowed(command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        log::debug!(
            "$ {}",
            self.redactor
                .redact(&format!("{} {}", command, args.join(" ")))
        );

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for name in &self.scrubbed_env {
            cmd.env_remove(name);
        }
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| CommandError::ExecutionFailed(format!("{}: {}", command, e)))?;

        Ok(CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: self
                .redactor
                .redact(&String::from_utf8_lossy(&output.stdout)),
            stderr: self
                .redactor
                .redact(&String::from_utf8_lossy(&output.stderr)),
        })
    }

    /// Whether `command` may be executed; a path is checked by its file name
    fn is_allowed(&self, command: &str) -> bool {
        let name = Path::new(command)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(command);
        self.allowed_commands.iter().any(|c| c == name)
    }
}
