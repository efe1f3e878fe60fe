//! Registry credential handling
//!
//! The token is held in a `secrecy::SecretString` for its whole life. It is
//! read once from the environment, exposed only to the uploader's child
//! process, and every stream captured from a child passes through a
//! [`Redactor`] before it reaches a log line, the terminal or the report.

use crate::core::error::PipelineError;
use aho_corasick::AhoCorasick;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Replacement text for redacted secrets
pub const REDACTED: &str = "***";

/// Opaque registry token
#[derive(Debug, Clone)]
pub struct Credential {
    env_var: String,
    secret: SecretString,
}

impl Credential {
    /// Read the credential from the process environment
    pub fn from_env(env_var: &str) -> Result<Self, PipelineError> {
        Self::from_lookup(env_var, std::env::var(env_var).ok())
    }

    /// Read the credential from an explicit environment map
    pub fn from_map(env_var: &str, env: &HashMap<String, String>) -> Result<Self, PipelineError> {
        Self::from_lookup(env_var, env.get(env_var).cloned())
    }

    fn from_lookup(env_var: &str, value: Option<String>) -> Result<Self, PipelineError> {
        match value {
            Some(value) if !value.trim().is_empty() => Ok(Self {
                env_var: env_var.to_string(),
                secret: SecretString::from(value),
            }),
            _ => Err(PipelineError::CredentialMissing {
                env_var: env_var.to_string(),
            }),
        }
    }

    /// Name of the variable the credential came from
    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    /// Raw value, for child-process environments only
    pub(crate) fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Redactor that scrubs this credential
    pub fn redactor(&self) -> Redactor {
        Redactor::new(&[self.expose()])
    }
}

/// Replaces every occurrence of a set of secrets with [`REDACTED`]
#[derive(Clone, Default)]
pub struct Redactor {
    matcher: Option<AhoCorasick>,
    fallback: Vec<SecretString>,
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Redactor {
    /// Build a redactor for `secrets`; empty strings are ignored
    pub fn new(secrets: &[&str]) -> Self {
        let patterns: Vec<&str> = secrets.iter().copied().filter(|s| !s.is_empty()).collect();
        if patterns.is_empty() {
            return Self::default();
        }

        match AhoCorasick::new(&patterns) {
            Ok(matcher) => Self {
                matcher: Some(matcher),
                fallback: Vec::new(),
            },
            Err(e) => {
                log::debug!("Falling back to plain replacement for redaction: {}", e);
                Self {
                    matcher: None,
                    fallback: patterns
                        .iter()
                        .map(|p| SecretString::from(p.to_string()))
                        .collect(),
                }
            }
        }
    }

    /// A redactor that leaves text untouched
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.matcher.is_some() || !self.fallback.is_empty()
    }

    /// Scrub all configured secrets from `text`
    pub fn redact(&self, text: &str) -> String {
        if let Some(matcher) = &self.matcher {
            let replacements = vec![REDACTED; matcher.patterns_len()];
            return matcher.replace_all(text, &replacements);
        }

        let mut masked = text.to_string();
        for secret in &self.fallback {
            masked = masked.replace(secret.expose_secret(), REDACTED);
        }
        masked
    }
}
