//! Release event parsing
//!
//! The trigger is a release webhook payload in the shape GitHub delivers it
//! (`GITHUB_EVENT_PATH`). Only the fields the sequence needs are read.

use crate::core::error::PipelineError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Action that starts a run
pub const PUBLISHED_ACTION: &str = "published";

lazy_static! {
    static ref VERSION_TAG: Regex =
        Regex::new(r"^v?\d+\.\d+\.\d+([.+\-]?[0-9A-Za-z.\-+]*)?$").expect("valid tag pattern");
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    action: Option<String>,
    release: Option<RawRelease>,
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    tag_name: Option<String>,
    target_commitish: Option<String>,
    #[serde(default)]
    prerelease: bool,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    clone_url: Option<String>,
}

/// Release metadata carried by the trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEvent {
    pub action: String,
    pub tag: String,
    /// Branch or commit the tag was created from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_commitish: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
    pub prerelease: bool,
}

impl ReleaseEvent {
    /// Build a published event for `tag` without a payload (manual runs)
    pub fn for_tag(tag: impl Into<String>) -> Self {
        Self {
            action: PUBLISHED_ACTION.to_string(),
            tag: tag.into(),
            target_commitish: None,
            clone_url: None,
            prerelease: false,
        }
    }

    /// Parse a webhook payload
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let raw: RawEvent = serde_json::from_str(json).map_err(|e| PipelineError::InvalidEvent {
            message: format!("Malformed event payload: {}", e),
        })?;

        let release = raw.release.ok_or_else(|| PipelineError::InvalidEvent {
            message: "Payload has no release object".to_string(),
        })?;

        let tag = release
            .tag_name
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::InvalidEvent {
                message: "Release has no tag_name".to_string(),
            })?;

        Ok(Self {
            action: raw.action.unwrap_or_default(),
            tag,
            target_commitish: release.target_commitish,
            clone_url: raw.repository.and_then(|r| r.clone_url),
            prerelease: release.prerelease,
        })
    }

    /// Read and parse a webhook payload file
    pub async fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::InvalidEvent {
                message: format!("Failed to read {}: {}", path.display(), e),
            })?;
        Self::from_json(&content)
    }

    /// Whether this event should start a run
    pub fn is_qualifying(&self) -> bool {
        self.action == PUBLISHED_ACTION
    }

    /// The ref the checkout step moves to: the tag itself
    pub fn checkout_ref(&self) -> &str {
        &self.tag
    }

    /// Tag without a leading `v`
    pub fn version(&self) -> &str {
        self.tag.strip_prefix('v').unwrap_or(&self.tag)
    }

    /// Reject tags that do not name a version
    pub fn validate(&self) -> Result<(), PipelineError> {
        if VERSION_TAG.is_match(&self.tag) {
            Ok(())
        } else {
            Err(PipelineError::InvalidEvent {
                message: format!("Tag '{}' does not look like a version", self.tag),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "action": "published",
        "release": {
            "tag_name": "v1.2.0",
            "target_commitish": "main",
            "prerelease": false
        },
        "repository": {
            "clone_url": "https://github.com/example/queuesync.git"
        }
    }"#;

    #[test]
    fn test_parse_published_event() {
        let event = ReleaseEvent::from_json(PAYLOAD).unwrap();
        assert_eq!(event.tag, "v1.2.0");
        assert_eq!(event.version(), "1.2.0");
        assert_eq!(event.checkout_ref(), "v1.2.0");
        assert_eq!(event.target_commitish.as_deref(), Some("main"));
        assert_eq!(
            event.clone_url.as_deref(),
            Some("https://github.com/example/queuesync.git")
        );
        assert!(event.is_qualifying());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_other_actions_do_not_qualify() {
        let payload = PAYLOAD.replace("\"published\"", "\"created\"");
        let event = ReleaseEvent::from_json(&payload).unwrap();
        assert!(!event.is_qualifying());
    }

    #[test]
    fn test_missing_release_is_invalid() {
        let err = ReleaseEvent::from_json(r#"{"action": "published"}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_EVENT");
    }

    #[test]
    fn test_malformed_payload_is_invalid() {
        let err = ReleaseEvent::from_json("not json").unwrap_err();
        assert_eq!(err.code(), "INVALID_EVENT");
    }

    #[test]
    fn test_tag_validation() {
        for tag in ["v1.2.0", "1.2.0", "v2.0.0rc1", "v1.0.0-beta.1", "1.2.3.post1"] {
            assert!(ReleaseEvent::for_tag(tag).validate().is_ok(), "{}", tag);
        }
        for tag in ["latest", "release", "v", "", "v1.2", "1"] {
            assert!(ReleaseEvent::for_tag(tag).validate().is_err(), "{}", tag);
        }
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, PAYLOAD).unwrap();

        let event = ReleaseEvent::from_file(&path).await.unwrap();
        assert_eq!(event.tag, "v1.2.0");
    }
}
