//! Configuration file loader for release-publisher
//!
//! This module provides configuration loading, validation, and layering.

use super::config::*;
use crate::core::error::PipelineError;
use crate::steps::runtime::VersionSpecifier;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".release-pipeline.yaml";

lazy_static! {
    /// Environment variable pattern (${VAR_NAME})
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern");
}

/// Values given on the command line (highest priority)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub runtime_version: Option<String>,
    pub manifest: Option<String>,
    pub output_dir: Option<String>,
    pub repository_url: Option<String>,
    pub skip_verify: bool,
    pub no_cache: bool,
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// CLI arguments (highest priority)
    pub overrides: ConfigOverrides,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options for `project_path` using the process environment
    pub fn from_env<P: AsRef<Path>>(project_path: P, overrides: ConfigOverrides) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
            overrides,
            env: std::env::vars().collect(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "publish.repository_url")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Project config (./.release-pipeline.yaml)
    /// 4. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PipelineConfig, PipelineError> {
        let mut config = Self::load_config_file(&options.project_path.join(CONFIG_FILENAME))
            .await?
            .unwrap_or_default();

        Self::apply_env(&mut config, &options.env);
        Self::apply_overrides(&mut config, &options.overrides);
        Self::expand_env_vars(&mut config, &options.env);

        Ok(config)
    }

    /// Load configuration from a YAML file, `None` if it does not exist
    async fn load_config_file(file_path: &Path) -> Result<Option<PipelineConfig>, PipelineError> {
        if !file_path.exists() {
            log::debug!("No config file at {}, using defaults", file_path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(file_path).await.map_err(|e| {
            PipelineError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        if content.trim().is_empty() {
            return Ok(Some(PipelineConfig::default()));
        }

        let config: PipelineConfig = serde_yaml::from_str(&content).map_err(|e| {
            PipelineError::ConfigError(format!("Failed to parse YAML config: {}", e))
        })?;

        log::debug!("Loaded config from {}", file_path.display());
        Ok(Some(config))
    }

    /// Apply `RELEASE_*` environment variables
    fn apply_env(config: &mut PipelineConfig, env: &HashMap<String, String>) {
        if let Some(version) = env.get("RELEASE_RUNTIME_VERSION") {
            config.runtime.version = version.clone();
        }
        if let Some(manifest) = env.get("RELEASE_MANIFEST") {
            config.cache.manifest = manifest.clone();
        }
        if let Some(output_dir) = env.get("RELEASE_OUTPUT_DIR") {
            config.build.output_dir = output_dir.clone();
        }
        if let Some(url) = env.get("RELEASE_REPOSITORY_URL") {
            config.publish.repository_url = url.clone();
        }
        if env.get("RELEASE_SKIP_VERIFY").map(|s| s.as_str()) == Some("true") {
            config.publish.verify = false;
        }
    }

    fn apply_overrides(config: &mut PipelineConfig, overrides: &ConfigOverrides) {
        if let Some(version) = &overrides.runtime_version {
            config.runtime.version = version.clone();
        }
        if let Some(manifest) = &overrides.manifest {
            config.cache.manifest = manifest.clone();
        }
        if let Some(output_dir) = &overrides.output_dir {
            config.build.output_dir = output_dir.clone();
        }
        if let Some(url) = &overrides.repository_url {
            config.publish.repository_url = url.clone();
        }
        if overrides.skip_verify {
            config.publish.verify = false;
        }
        if overrides.no_cache {
            config.cache.enabled = false;
        }
    }

    /// Expand `${VAR}` references in path and URL fields.
    ///
    /// The credential is never read through this path; `publish.token_env`
    /// only names the variable.
    fn expand_env_vars(config: &mut PipelineConfig, env: &HashMap<String, String>) {
        config.publish.repository_url = Self::expand_string(&config.publish.repository_url, env);
        config.publish.verify_url = Self::expand_string(&config.publish.verify_url, env);
        config.cache.dir = Self::expand_string(&config.cache.dir, env);
        if let Some(store) = &config.cache.store {
            config.cache.store = Some(Self::expand_string(store, env));
        }
        if let Some(repository) = &config.checkout.repository {
            config.checkout.repository = Some(Self::expand_string(repository, env));
        }
    }

    /// Expand environment variables in a single string; unknown ones are kept
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        ENV_VAR_PATTERN
            .replace_all(input, |caps: &regex::Captures<'_>| {
                let var_name = &caps[1];
                match env.get(var_name) {
                    Some(value) => value.clone(),
                    None => {
                        log::warn!("Environment variable {} not found", var_name);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    /// Validate configuration
    pub fn validate(config: &PipelineConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "Version is required".to_string(),
            });
        } else if config.version != "1.0" {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("Unknown version: {}", config.version),
                suggestion: Some("Currently supported version is \"1.0\" only".to_string()),
            });
        }

        if let Err(e) = VersionSpecifier::parse(&config.runtime.version) {
            errors.push(ConfigValidationError {
                field: "runtime.version".to_string(),
                message: e,
            });
        }

        if config.cache.enabled {
            if config.cache.manifest.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: "cache.manifest".to_string(),
                    message: "manifest is required when the cache is enabled".to_string(),
                });
            }
            if config.cache.dir.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: "cache.dir".to_string(),
                    message: "dir is required when the cache is enabled".to_string(),
                });
            }
        }

        if config.install.packages.is_empty() {
            warnings.push(ConfigValidationWarning {
                field: "install.packages".to_string(),
                message: "No build-time packages will be installed".to_string(),
                suggestion: Some("The build frontend must already be available".to_string()),
            });
        }

        if config.build.frontend.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "build.frontend".to_string(),
                message: "frontend is required".to_string(),
            });
        }

        if config.build.output_dir.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "build.output_dir".to_string(),
                message: "output_dir is required".to_string(),
            });
        } else if !is_workspace_subdir(&config.build.output_dir) {
            // The build step empties this directory
            errors.push(ConfigValidationError {
                field: "build.output_dir".to_string(),
                message: format!(
                    "output_dir must be a relative directory inside the project: {}",
                    config.build.output_dir
                ),
            });
        }

        for (field, url) in [
            ("publish.repository_url", &config.publish.repository_url),
            ("publish.verify_url", &config.publish.verify_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: format!("Not an http(s) URL: {}", url),
                });
            } else if url.starts_with("http://") {
                warnings.push(ConfigValidationWarning {
                    field: field.to_string(),
                    message: "Plain http endpoint".to_string(),
                    suggestion: Some("Use https for registry traffic".to_string()),
                });
            }
        }

        if config.publish.token_env.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "publish.token_env".to_string(),
                message: "token_env is required".to_string(),
            });
        }

        if config.timeouts.step_seconds == Some(0) {
            errors.push(ConfigValidationError {
                field: "timeouts.step_seconds".to_string(),
                message: "step_seconds must be greater than zero".to_string(),
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Write the default configuration file into `project_path`
    pub async fn write_default(project_path: &Path, force: bool) -> Result<PathBuf, PipelineError> {
        let path = project_path.join(CONFIG_FILENAME);
        if path.exists() && !force {
            return Err(PipelineError::ConfigError(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        let yaml = serde_yaml::to_string(&PipelineConfig::default())
            .map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        fs::write(&path, yaml)
            .await
            .map_err(|e| PipelineError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(path)
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}
