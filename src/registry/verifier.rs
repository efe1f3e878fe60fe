//! Post-publish verification against the registry JSON API
//!
//! After an upload the release should be visible at
//! `<base>/<name>/<version>/json`. Verification is advisory: the upload
//! already succeeded, so a failure here only becomes a warning.

use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;

/// Outcome of a verification request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Visible { url: String },
    NotFound { url: String },
    Failed { url: String, message: String },
}

/// Package name and version encoded in an artifact file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactIdentity {
    pub name: String,
    pub version: String,
}

impl ArtifactIdentity {
    /// Parse `name-version.tar.gz` / `name-version-tags.whl`
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;

        let (name, version) = if let Some(stem) = file_name.strip_suffix(".whl") {
            let mut parts = stem.split('-');
            (parts.next()?, parts.next()?)
        } else {
            let stem = file_name
                .strip_suffix(".tar.gz")
                .or_else(|| file_name.strip_suffix(".zip"))?;
            stem.rsplit_once('-')?
        };

        if name.is_empty() || version.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Checks that a published version is visible on the registry
#[derive(Debug, Clone)]
pub struct RegistryVerifier {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryVerifier {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("release-publisher/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn release_url(&self, identity: &ArtifactIdentity) -> String {
        format!(
            "{}/{}/{}/json",
            self.base_url, identity.name, identity.version
        )
    }

    pub async fn verify(&self, identity: &ArtifactIdentity) -> Verification {
        let url = self.release_url(identity);
        log::debug!("Verifying {}", url);

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Verification::Visible { url },
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                Verification::NotFound { url }
            }
            Ok(response) => Verification::Failed {
                message: format!("unexpected status {}", response.status()),
                url,
            },
            Err(e) => Verification::Failed {
                message: e.to_string(),
                url,
            },
        }
    }
}
