//! Cache key derivation
//!
//! A key is `<os>-<prefix>-<sha256 of the manifest>`. Identical manifests on
//! the same OS always produce the same key.

use crate::core::error::PipelineError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Host OS identity as CI platforms spell it
pub fn runner_os() -> String {
    if let Ok(os) = std::env::var("RUNNER_OS")
        && !os.trim().is_empty()
    {
        return os;
    }
    runner_os_for(std::env::consts::OS)
}

/// Map a `std::env::consts::OS` value to its CI spelling
pub fn runner_os_for(os: &str) -> String {
    match os {
        "linux" => "Linux".to_string(),
        "macos" => "macOS".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    }
}

/// Derived cache identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for manifest `contents`
    pub fn derive(os: &str, prefix: &str, contents: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(contents);
        Self(format!("{}-{}-{:x}", os, prefix, hasher.finalize()))
    }

    /// Key for the manifest at `manifest`
    pub async fn for_manifest(os: &str, prefix: &str, manifest: &Path) -> Result<Self, PipelineError> {
        let contents =
            tokio::fs::read(manifest)
                .await
                .map_err(|_| PipelineError::ManifestNotFound {
                    path: manifest.display().to_string(),
                })?;
        Ok(Self::derive(os, prefix, &contents))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_derive_is_stable() {
        let a = CacheKey::derive("Linux", "pip", b"setup(name='queuesync')");
        let b = CacheKey::derive("Linux", "pip", b"setup(name='queuesync')");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("Linux-pip-"));
        // 64 hex chars of SHA-256
        assert_eq!(a.as_str().len(), "Linux-pip-".len() + 64);
    }

    #[test]
    fn test_derive_known_digest() {
        let key = CacheKey::derive("Linux", "pip", b"");
        assert_eq!(
            key.as_str(),
            "Linux-pip-e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_manifest_change_changes_key() {
        let a = CacheKey::derive("Linux", "pip", b"version='1.0.0'");
        let b = CacheKey::derive("Linux", "pip", b"version='1.0.1'");
        assert_ne!(a, b);
    }

    #[test]
    fn test_os_changes_key() {
        let a = CacheKey::derive("Linux", "pip", b"same");
        let b = CacheKey::derive("Windows", "pip", b"same");
        assert_ne!(a, b);
    }

    #[test]
    fn test_runner_os_for() {
        assert_eq!(runner_os_for("linux"), "Linux");
        assert_eq!(runner_os_for("macos"), "macOS");
        assert_eq!(runner_os_for("windows"), "Windows");
        assert_eq!(runner_os_for("freebsd"), "freebsd");
    }

    #[tokio::test]
    async fn test_for_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("setup.py");
        std::fs::write(&manifest, "from setuptools import setup\n").unwrap();

        let key = CacheKey::for_manifest("Linux", "pip", &manifest).await.unwrap();
        assert_eq!(
            key,
            CacheKey::derive("Linux", "pip", b"from setuptools import setup\n")
        );
    }

    #[tokio::test]
    async fn test_for_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let err = CacheKey::for_manifest("Linux", "pip", &dir.path().join("setup.py"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MANIFEST_NOT_FOUND");
    }
}
