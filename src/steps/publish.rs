//! Publish step - upload the artifacts with twine
//!
//! The credential enters the child process as `TWINE_PASSWORD` and nowhere
//! else. There is no retry: a rejected upload, duplicate or not, fails the job.

use crate::core::context::{JobContext, TWINE_PASSWORD};
use crate::core::error::PipelineError;
use crate::core::state_machine::JobState;
use crate::core::traits::{Step, StepOutcome};
use crate::registry::{ArtifactIdentity, RegistryVerifier, Verification};
use crate::security::credential::Credential;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Registry messages for an already-published file or version
    static ref DUPLICATE_REJECTION: Regex = Regex::new(
        r"(?i)(file already exists|filename has already been used|409 conflict|version .* already exists)"
    )
    .expect("valid rejection pattern");
}

/// Whether uploader output says the version is already on the registry
pub fn is_duplicate_rejection(output: &str) -> bool {
    DUPLICATE_REJECTION.is_match(output)
}

#[derive(Debug)]
pub struct PublishStep {
    credential: Option<Credential>,
}

impl PublishStep {
    /// `credential` may be `None` for dry runs; a real upload then fails
    pub fn new(credential: Option<Credential>) -> Self {
        Self { credential }
    }

    fn artifact_args(ctx: &JobContext) -> Vec<String> {
        ctx.artifacts
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }

    async fn check(&self, ctx: &JobContext) -> Result<StepOutcome, PipelineError> {
        let executor = ctx.executor()?;
        let artifacts = Self::artifact_args(ctx);
        let mut args = vec!["-m", "twine", "check"];
        args.extend(artifacts.iter().map(|s| s.as_str()));

        let output = executor
            .execute(ctx.runtime(), &args)
            .await
            .map_err(|e| PipelineError::PublishFailed {
                message: e.to_string(),
            })?;

        if !output.success {
            return Err(PipelineError::PublishFailed {
                message: format!("twine check failed: {}", output.tail(20)),
            });
        }

        Ok(StepOutcome::new(format!(
            "dry run: {} artifact(s) passed twine check, upload skipped",
            artifacts.len()
        )))
    }

    async fn upload(
        &self,
        ctx: &JobContext,
        credential: &Credential,
    ) -> Result<StepOutcome, PipelineError> {
        let executor = ctx.executor()?;
        let artifacts = Self::artifact_args(ctx);
        let publish = &ctx.config.publish;

        let mut args = vec![
            "-m",
            "twine",
            "upload",
            "--non-interactive",
            "--repository-url",
            publish.repository_url.as_str(),
        ];
        args.extend(artifacts.iter().map(|s| s.as_str()));

        let envs = [
            ("TWINE_USERNAME", publish.username.as_str()),
            (TWINE_PASSWORD, credential.expose()),
        ];

        let output = executor
            .execute_with_env(ctx.runtime(), &args, &envs)
            .await
            .map_err(|e| PipelineError::PublishFailed {
                message: e.to_string(),
            })?;

        if !output.success {
            let text = output.combined();
            if is_duplicate_rejection(&text) {
                return Err(PipelineError::VersionConflict {
                    version: ctx.event.version().to_string(),
                });
            }
            return Err(PipelineError::PublishFailed {
                message: output.tail(20),
            });
        }

        Ok(StepOutcome::new(format!(
            "uploaded {} artifact(s) to {}",
            artifacts.len(),
            publish.repository_url
        )))
    }

    async fn verify(ctx: &JobContext, outcome: StepOutcome) -> StepOutcome {
        let Some(identity) = ctx.artifacts.iter().find_map(|p| ArtifactIdentity::from_path(p))
        else {
            return outcome.with_warning("could not determine package name for verification");
        };

        let verifier = match RegistryVerifier::new(&ctx.config.publish.verify_url) {
            Ok(verifier) => verifier,
            Err(e) => return outcome.with_warning(format!("verification skipped: {}", e)),
        };

        match verifier.verify(&identity).await {
            Verification::Visible { url } => {
                log::info!("Release visible at {}", url);
                outcome
            }
            Verification::NotFound { url } => outcome.with_warning(format!(
                "{} {} not visible yet at {}",
                identity.name, identity.version, url
            )),
            Verification::Failed { url, message } => {
                outcome.with_warning(format!("verification of {} failed: {}", url, message))
            }
        }
    }
}

#[async_trait]
impl Step for PublishStep {
    fn name(&self) -> &str {
        "publish"
    }

    fn state(&self) -> JobState {
        JobState::Publishing
    }

    async fn run(&self, ctx: &mut JobContext) -> Result<StepOutcome, PipelineError> {
        if ctx.artifacts.is_empty() {
            return Err(PipelineError::PublishFailed {
                message: "no artifacts to publish".to_string(),
            });
        }

        if ctx.dry_run {
            return self.check(ctx).await;
        }

        let credential =
            self.credential
                .as_ref()
                .ok_or_else(|| PipelineError::CredentialMissing {
                    env_var: ctx.config.publish.token_env.clone(),
                })?;

        let outcome = self.upload(ctx, credential).await?;

        if ctx.config.publish.verify {
            Ok(Self::verify(ctx, outcome).await)
        } else {
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PipelineConfig;
    use crate::core::event::ReleaseEvent;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_duplicate_rejection_messages() {
        assert!(is_duplicate_rejection(
            "HTTPError: 400 Bad Request from https://upload.pypi.org/legacy/\n\
             File already exists. See https://pypi.org/help/#file-name-reuse"
        ));
        assert!(is_duplicate_rejection(
            "This filename has already been used, use a different version."
        ));
        assert!(is_duplicate_rejection("HTTPError: 409 Conflict"));
        assert!(!is_duplicate_rejection(
            "HTTPError: 403 Forbidden Invalid or non-existent authentication information."
        ));
    }

    fn context(dir: &TempDir) -> JobContext {
        let mut ctx = JobContext::new(
            ReleaseEvent::for_tag("v1.2.0"),
            PipelineConfig::default(),
            dir.path(),
        );
        ctx.artifacts = vec![PathBuf::from("dist/queuesync-1.2.0.tar.gz")];
        ctx
    }

    #[tokio::test]
    async fn test_missing_credential_fails() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);

        let err = PublishStep::new(None).run(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), "CREDENTIAL_MISSING");
        assert!(err.to_string().contains("PYPI_API_TOKEN"));
    }

    #[tokio::test]
    async fn test_no_artifacts_fails() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.artifacts.clear();

        let mut env = HashMap::new();
        env.insert("PYPI_API_TOKEN".to_string(), "pypi-token-value".to_string());
        let credential = Credential::from_map("PYPI_API_TOKEN", &env).unwrap();

        let err = PublishStep::new(Some(credential))
            .run(&mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PUBLISH_FAILED");
    }

    #[tokio::test]
    async fn test_upload_error_does_not_leak_credential() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.runtime_command = Some("not-a-python".to_string());

        let mut env = HashMap::new();
        env.insert("PYPI_API_TOKEN".to_string(), "pypi-token-value".to_string());
        let credential = Credential::from_map("PYPI_API_TOKEN", &env).unwrap();

        let err = PublishStep::new(Some(credential))
            .run(&mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert!(!err.to_string().contains("pypi-token-value"));
        assert!(!format!("{:?}", err).contains("pypi-token-value"));
    }

    #[cfg(unix)]
    mod with_fake_runtime {
        use super::*;
        use crate::steps::testing::{fake_runtime, read_log};
        use std::path::Path;

        const TOKEN: &str = "pypi-publish-secret";

        fn context(dir: &TempDir, token_env: &str, runtime: &Path) -> JobContext {
            let mut ctx = super::context(dir);
            ctx.config.publish.token_env = token_env.to_string();
            ctx.config.publish.verify = false;
            ctx.runtime_command = Some(runtime.display().to_string());
            ctx
        }

        fn credential(token_env: &str) -> Credential {
            let mut env = HashMap::new();
            env.insert(token_env.to_string(), TOKEN.to_string());
            Credential::from_map(token_env, &env).unwrap()
        }

        #[tokio::test]
        async fn test_upload_receives_token_only_as_twine_password() {
            const TOKEN_ENV: &str = "RELEASE_PUBLISHER_PUBLISH_TEST_TOKEN";
            // SAFETY: no other test reads or writes this variable
            unsafe { std::env::set_var(TOKEN_ENV, TOKEN) };

            let dir = TempDir::new().unwrap();
            let runtime = fake_runtime(
                dir.path(),
                r#"echo "$@" > "$LOG_DIR/args.log"; env > "$LOG_DIR/env.log"; echo "Uploading distributions""#,
            );
            let mut ctx = context(&dir, TOKEN_ENV, &runtime);

            let outcome = PublishStep::new(Some(credential(TOKEN_ENV)))
                .run(&mut ctx)
                .await
                .unwrap();
            assert_eq!(
                outcome.summary,
                "uploaded 1 artifact(s) to https://upload.pypi.org/legacy/"
            );

            assert_eq!(
                read_log(&runtime, "args.log").trim(),
                "-m twine upload --non-interactive --repository-url \
                 https://upload.pypi.org/legacy/ dist/queuesync-1.2.0.tar.gz"
            );
            let env = read_log(&runtime, "env.log");
            assert!(env.lines().any(|l| l == format!("TWINE_PASSWORD={}", TOKEN)));
            assert!(env.lines().any(|l| l == "TWINE_USERNAME=__token__"));
            assert!(!env.contains(TOKEN_ENV));
        }

        #[tokio::test]
        async fn test_duplicate_upload_is_version_conflict() {
            let dir = TempDir::new().unwrap();
            let runtime = fake_runtime(
                dir.path(),
                r#"echo call >> "$LOG_DIR/calls.log"
echo "HTTPError: 400 Bad Request from https://upload.pypi.org/legacy/" >&2
echo "File already exists. See https://pypi.org/help/#file-name-reuse" >&2
exit 1"#,
            );
            let mut ctx = context(&dir, "PYPI_API_TOKEN", &runtime);

            let err = PublishStep::new(Some(credential("PYPI_API_TOKEN")))
                .run(&mut ctx)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "VERSION_CONFLICT");
            assert!(err.to_string().contains("1.2.0"));
            assert_eq!(read_log(&runtime, "calls.log").lines().count(), 1);
        }

        #[tokio::test]
        async fn test_rejected_upload_output_is_redacted() {
            let dir = TempDir::new().unwrap();
            let runtime = fake_runtime(
                dir.path(),
                r#"echo "HTTPError: 403 Forbidden for password $TWINE_PASSWORD" >&2; exit 1"#,
            );
            let credential = credential("PYPI_API_TOKEN");
            let mut ctx = context(&dir, "PYPI_API_TOKEN", &runtime).with_redactor(credential.redactor());

            let err = PublishStep::new(Some(credential))
                .run(&mut ctx)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "PUBLISH_FAILED");
            let message = err.to_string();
            assert!(message.contains("403 Forbidden for password ***"), "{}", message);
            assert!(!message.contains(TOKEN));
        }

        #[tokio::test]
        async fn test_dry_run_checks_instead_of_uploading() {
            let dir = TempDir::new().unwrap();
            let runtime = fake_runtime(
                dir.path(),
                r#"echo "$@" > "$LOG_DIR/args.log"; echo "Checking dist/queuesync-1.2.0.tar.gz: PASSED""#,
            );
            let mut ctx = context(&dir, "PYPI_API_TOKEN", &runtime);
            ctx.dry_run = true;

            let outcome = PublishStep::new(None).run(&mut ctx).await.unwrap();
            assert!(outcome.summary.starts_with("dry run"));
            assert_eq!(
                read_log(&runtime, "args.log").trim(),
                "-m twine check dist/queuesync-1.2.0.tar.gz"
            );
        }
    }
}
