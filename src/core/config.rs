//! Configuration structures and types for release-publisher
//!
//! This module provides type-safe configuration management with serde support.
//! Every section has defaults that reproduce the usual Python release job:
//! `python -m build` followed by `twine upload` to PyPI.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Whether `path` names a directory strictly below the workspace.
///
/// Only relative paths made of plain components qualify: `.`, `..`, the
/// filesystem root and absolute paths are all rejected.
pub fn is_workspace_subdir(path: &str) -> bool {
    let mut named = false;
    for component in Path::new(path.trim()).components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    named
}

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Schema version
    pub version: String,

    /// Source checkout settings
    pub checkout: CheckoutConfig,

    /// Language runtime settings
    pub runtime: RuntimeConfig,

    /// Dependency download cache settings
    pub cache: CacheConfig,

    /// Build-time dependency installation
    pub install: InstallConfig,

    /// Build frontend invocation
    pub build: BuildConfig,

    /// Registry upload settings
    pub publish: PublishConfig,

    /// Per-step time limits
    pub timeouts: TimeoutConfig,
}

/// Source checkout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Clone URL used when the working directory has no repository yet.
    /// Falls back to the clone URL carried by the release event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Fetch tags from the remote before checking out the ref
    pub fetch_tags: bool,
}

/// Language runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Version specifier (`3.x`, `3.11`, `3.11.4`)
    pub version: String,

    /// Interpreter command; when unset, `python3` then `python` are tried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Dependency cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable cache restore/save
    pub enabled: bool,

    /// Manifest whose contents are hashed into the cache key
    pub manifest: String,

    /// Key prefix placed between the OS identity and the manifest hash
    pub prefix: String,

    /// Package-download cache directory handed to the installer
    pub dir: String,

    /// Directory holding saved caches, one subdirectory per key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

/// Dependency install configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstallConfig {
    /// Upgrade the installer itself first
    pub upgrade_installer: bool,

    /// Build-time packages
    pub packages: Vec<String>,
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Module run with `<runtime> -m`
    pub frontend: String,

    /// Extra arguments for the frontend
    pub args: Vec<String>,

    /// Output directory for distributable artifacts
    pub output_dir: String,
}

/// Publish configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PublishConfig {
    /// Registry upload endpoint
    pub repository_url: String,

    /// Environment variable holding the registry token
    pub token_env: String,

    /// Username sent alongside the token
    pub username: String,

    /// Verify the version is visible on the registry after upload
    pub verify: bool,

    /// Registry JSON API base used for verification
    pub verify_url: String,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum duration of a single step in seconds (unset: no limit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_seconds: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            checkout: CheckoutConfig::default(),
            runtime: RuntimeConfig::default(),
            cache: CacheConfig::default(),
            install: InstallConfig::default(),
            build: BuildConfig::default(),
            publish: PublishConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            repository: None,
            fetch_tags: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: "3.x".to_string(),
            command: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manifest: "setup.py".to_string(),
            prefix: "pip".to_string(),
            dir: ".release-cache/pip".to_string(),
            store: None,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            upgrade_installer: true,
            packages: vec!["build".to_string(), "twine".to_string()],
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            frontend: "build".to_string(),
            args: Vec::new(),
            output_dir: "dist".to_string(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            repository_url: "https://upload.pypi.org/legacy/".to_string(),
            token_env: "PYPI_API_TOKEN".to_string(),
            username: "__token__".to_string(),
            verify: true,
            verify_url: "https://pypi.org/pypi".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.runtime.version, "3.x");
        assert_eq!(config.cache.manifest, "setup.py");
        assert_eq!(config.publish.token_env, "PYPI_API_TOKEN");
        assert_eq!(config.install.packages, vec!["build", "twine"]);
    }

    #[test]
    fn test_serialize_config() {
        let config = PipelineConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("version: '1.0'"));
        assert!(yaml.contains("output_dir: dist"));
        assert!(!yaml.contains("step_seconds"));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let yaml = r#"
runtime:
  version: "3.11"
cache:
  manifest: requirements.txt
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.runtime.version, "3.11");
        assert_eq!(config.cache.manifest, "requirements.txt");
        // Untouched fields keep their defaults
        assert_eq!(config.cache.prefix, "pip");
        assert_eq!(config.build.frontend, "build");
        assert!(config.publish.verify);
    }

    #[test]
    fn test_is_workspace_subdir() {
        assert!(is_workspace_subdir("dist"));
        assert!(is_workspace_subdir("./build/dist"));
        assert!(!is_workspace_subdir("."));
        assert!(!is_workspace_subdir("./"));
        assert!(!is_workspace_subdir(".."));
        assert!(!is_workspace_subdir("dist/../.."));
        assert!(!is_workspace_subdir("/"));
        assert!(!is_workspace_subdir("/tmp/dist"));
        assert!(!is_workspace_subdir(""));
    }

    #[test]
    fn test_deserialize_timeouts() {
        let yaml = "timeouts:\n  step_seconds: 600\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timeouts.step_seconds, Some(600));
    }
}
