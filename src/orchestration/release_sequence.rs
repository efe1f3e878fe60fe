//! Release Sequence - main orchestrator for a release run
//!
//! Runs the steps strictly in order:
//! - checkout, runtime setup, cache restore, dependency install, build, publish
//! - the first fatal failure stops the run; later steps are skipped
//! - post hooks (cache save) run in reverse order only after full success
//! - nothing is retried

use crate::cache::dependency_cache::DependencyCache;
use crate::core::context::JobContext;
use crate::core::error::PipelineError;
use crate::core::state_machine::{JobState, JobStateMachine};
use crate::core::traits::{Step, StepOutcome};
use crate::orchestration::report::{JobReport, StepRecord, StepStatus};
use crate::security::credential::Credential;
use crate::steps::{
    BuildStep, CheckoutStep, InstallStep, PublishStep, RestoreCacheStep, RuntimeStep,
};
use chrono::Utc;
use std::time::{Duration, Instant};

/// Ordered list of steps plus the per-step time limit
pub struct ReleaseSequence {
    steps: Vec<Box<dyn Step>>,
    step_timeout: Option<Duration>,
    progress: bool,
}

impl ReleaseSequence {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            step_timeout: None,
            progress: true,
        }
    }

    /// The six standard steps
    pub fn standard(cache: DependencyCache, credential: Option<Credential>) -> Self {
        Self::new(vec![
            Box::new(CheckoutStep::new()),
            Box::new(RuntimeStep::new()),
            Box::new(RestoreCacheStep::new(cache)),
            Box::new(InstallStep::new()),
            Box::new(BuildStep::new()),
            Box::new(PublishStep::new(credential)),
        ])
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Print per-step progress lines to stdout (on by default)
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Step names in execution order
    pub fn plan(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Execute the sequence for the run described by `ctx`
    pub async fn run(&self, ctx: &mut JobContext) -> JobReport {
        let started_at = Utc::now();
        let start_time = Instant::now();
        let mut machine = JobStateMachine::new();
        let mut records: Vec<StepRecord> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        log::info!("Run {} started for {}", ctx.run_id, ctx.event.tag);

        let failure = match ctx.event.validate() {
            Err(e) => Some(e),
            Ok(()) => {
                self.run_steps(ctx, &mut machine, &mut records, &mut warnings)
                    .await
            }
        };

        match &failure {
            None => {
                if let Err(e) = machine.transition(JobState::Succeeded) {
                    log::error!("{}", e);
                }
                self.run_post_hooks(ctx, &mut warnings).await;
            }
            Some(_) => machine.fail(),
        }

        let redactor = ctx.redactor();
        let report = JobReport {
            run_id: ctx.run_id,
            tag: ctx.event.tag.clone(),
            runner_os: ctx.runner_os.clone(),
            success: failure.is_none() && machine.get_state() == JobState::Succeeded,
            final_state: machine.get_state(),
            dry_run: ctx.dry_run,
            cache_key: ctx.cache_key.as_ref().map(|k| k.to_string()),
            cache_hit: ctx.cache_hit,
            artifacts: ctx
                .artifacts
                .iter()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
                .collect(),
            steps: records,
            warnings: warnings.iter().map(|w| redactor.redact(w)).collect(),
            error_code: failure.as_ref().map(|e| e.code().to_string()),
            error: failure.as_ref().map(|e| redactor.redact(&e.to_string())),
            rerunnable: failure.as_ref().map(|e| e.is_rerunnable()),
            suggested_actions: failure
                .as_ref()
                .map(|e| e.suggested_actions().iter().map(|a| a.to_string()).collect())
                .unwrap_or_default(),
            transitions: machine.transitions().to_vec(),
            started_at,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        log::info!(
            "Run {} finished: {}\n{}",
            report.run_id,
            report.final_state,
            machine.get_history()
        );

        report
    }

    /// Run every step; returns the error that stopped the run, if any
    async fn run_steps(
        &self,
        ctx: &mut JobContext,
        machine: &mut JobStateMachine,
        records: &mut Vec<StepRecord>,
        warnings: &mut Vec<String>,
    ) -> Option<PipelineError> {
        let total = self.steps.len();

        for (index, step) in self.steps.iter().enumerate() {
            if let Err(e) = machine.transition(step.state()) {
                self.skip_remaining(index, records);
                return Some(e);
            }

            self.say(format!("▶️  [{}/{}] {}", index + 1, total, step.name()));
            let step_start = Instant::now();
            let result = self.run_step(step.as_ref(), ctx).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;
            let redactor = ctx.redactor();

            match result {
                Ok(outcome) => {
                    let summary = redactor.redact(&outcome.summary);
                    self.say(format!("  ✅ {}\n", summary));
                    for warning in &outcome.warnings {
                        self.say(format!("  ⚠️  {}", redactor.redact(warning)));
                    }
                    warnings.extend(
                        outcome
                            .warnings
                            .iter()
                            .map(|w| format!("{}: {}", step.name(), w)),
                    );
                    records.push(StepRecord {
                        name: step.name().to_string(),
                        state: step.state(),
                        status: StepStatus::Succeeded,
                        summary: Some(summary),
                        error: None,
                        duration_ms,
                    });
                }
                Err(e) if !step.is_fatal() => {
                    let message = redactor.redact(&e.to_string());
                    log::warn!("{} failed (non-fatal): {}", step.name(), message);
                    self.say(format!("  ⚠️  {} (continuing)\n", message));
                    warnings.push(format!("{}: {}", step.name(), message));
                    records.push(StepRecord {
                        name: step.name().to_string(),
                        state: step.state(),
                        status: StepStatus::Warning,
                        summary: None,
                        error: Some(message),
                        duration_ms,
                    });
                }
                Err(e) => {
                    let message = redactor.redact(&e.to_string());
                    log::error!("{} failed: {}", step.name(), message);
                    self.say(format!("  ❌ {}\n", message));
                    records.push(StepRecord {
                        name: step.name().to_string(),
                        state: step.state(),
                        status: StepStatus::Failed,
                        summary: None,
                        error: Some(message),
                        duration_ms,
                    });
                    self.skip_remaining(index + 1, records);
                    return Some(e);
                }
            }
        }

        None
    }

    async fn run_step(
        &self,
        step: &dyn Step,
        ctx: &mut JobContext,
    ) -> Result<StepOutcome, PipelineError> {
        match self.step_timeout {
            Some(timeout) => tokio::time::timeout(timeout, step.run(ctx))
                .await
                .unwrap_or_else(|_| {
                    Err(PipelineError::Timeout {
                        step: step.name().to_string(),
                        timeout,
                    })
                }),
            None => step.run(ctx).await,
        }
    }

    async fn run_post_hooks(&self, ctx: &mut JobContext, warnings: &mut Vec<String>) {
        for step in self.steps.iter().rev() {
            match step.post(ctx).await {
                Ok(Some(message)) => {
                    log::info!("post {}: {}", step.name(), message);
                    self.say(format!("  📦 {}", message));
                }
                Ok(None) => {}
                Err(e) => {
                    let message = ctx.redactor().redact(&e.to_string());
                    log::warn!("post {} failed: {}", step.name(), message);
                    warnings.push(format!("{} (post): {}", step.name(), message));
                }
            }
        }
    }

    fn say(&self, line: String) {
        if self.progress {
            println!("{}", line);
        }
    }

    fn skip_remaining(&self, from: usize, records: &mut Vec<StepRecord>) {
        for step in self.steps.iter().skip(from) {
            records.push(StepRecord::skipped(step.name(), step.state()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PipelineConfig;
    use crate::core::event::ReleaseEvent;
    use crate::security::credential::Redactor;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Scripted step that records its invocations
    struct FakeStep {
        name: &'static str,
        state: JobState,
        fatal: bool,
        error: Option<fn() -> PipelineError>,
        delay: Option<Duration>,
        journal: Journal,
    }

    impl FakeStep {
        fn ok(name: &'static str, state: JobState, journal: &Journal) -> Self {
            Self {
                name,
                state,
                fatal: true,
                error: None,
                delay: None,
                journal: journal.clone(),
            }
        }

        fn failing(mut self, error: fn() -> PipelineError) -> Self {
            self.error = Some(error);
            self
        }

        fn non_fatal(mut self) -> Self {
            self.fatal = false;
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl Step for FakeStep {
        fn name(&self) -> &str {
            self.name
        }

        fn state(&self) -> JobState {
            self.state
        }

        fn is_fatal(&self) -> bool {
            self.fatal
        }

        async fn run(&self, _ctx: &mut JobContext) -> Result<StepOutcome, PipelineError> {
            self.journal.lock().unwrap().push(self.name.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.error {
                Some(error) => Err(error()),
                None => Ok(StepOutcome::new(format!("{} done", self.name))),
            }
        }

        async fn post(&self, _ctx: &mut JobContext) -> Result<Option<String>, PipelineError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("post:{}", self.name));
            Ok(None)
        }
    }

    fn six_steps(journal: &Journal) -> Vec<FakeStep> {
        vec![
            FakeStep::ok("checkout", JobState::CheckingOut, journal),
            FakeStep::ok("runtime", JobState::ProvisioningRuntime, journal),
            FakeStep::ok("cache", JobState::RestoringCache, journal).non_fatal(),
            FakeStep::ok("install", JobState::InstallingDependencies, journal),
            FakeStep::ok("build", JobState::Building, journal),
            FakeStep::ok("publish", JobState::Publishing, journal),
        ]
    }

    fn sequence(steps: Vec<FakeStep>) -> ReleaseSequence {
        ReleaseSequence::new(
            steps
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn Step>)
                .collect(),
        )
    }

    fn context(tag: &str) -> JobContext {
        JobContext::new(
            ReleaseEvent::for_tag(tag),
            PipelineConfig::default(),
            std::env::temp_dir(),
        )
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let journal = journal();
        let report = sequence(six_steps(&journal)).run(&mut context("v1.2.0")).await;

        assert!(report.success);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.final_state, JobState::Succeeded);
        assert_eq!(report.steps.len(), 6);
        assert!(report.steps.iter().all(|s| s.status == StepStatus::Succeeded));
        assert_eq!(report.transitions.len(), 7);
        assert_eq!(report.rerunnable, None);
        assert_eq!(
            entries(&journal),
            vec![
                "checkout", "runtime", "cache", "install", "build", "publish",
                "post:publish", "post:build", "post:install", "post:cache", "post:runtime",
                "post:checkout",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_before_publish_prevents_publish() {
        for failing in ["checkout", "runtime", "install", "build"] {
            let journal = journal();
            let steps = six_steps(&journal)
                .into_iter()
                .map(|s| {
                    if s.name == failing {
                        s.failing(|| PipelineError::BuildFailed {
                            message: "boom".to_string(),
                        })
                    } else {
                        s
                    }
                })
                .collect();

            let report = sequence(steps).run(&mut context("v1.2.0")).await;

            assert!(!report.success, "{}", failing);
            assert_eq!(report.exit_code(), 1);
            assert_eq!(report.final_state, JobState::Failed);
            let ran = entries(&journal);
            assert!(!ran.contains(&"publish".to_string()), "{}", failing);
            assert!(!ran.iter().any(|e| e.starts_with("post:")), "{}", failing);
            assert_eq!(report.failed_step().unwrap().name, failing);
            let publish = report.steps.iter().find(|s| s.name == "publish").unwrap();
            assert_eq!(publish.status, StepStatus::Skipped);
        }
    }

    #[tokio::test]
    async fn test_cache_failure_is_not_fatal() {
        let journal = journal();
        let steps = six_steps(&journal)
            .into_iter()
            .map(|s| {
                if s.name == "cache" {
                    s.failing(|| PipelineError::CacheFailed {
                        message: "restore failed: permission denied".to_string(),
                    })
                } else {
                    s
                }
            })
            .collect();

        let report = sequence(steps).run(&mut context("v1.2.0")).await;

        assert!(report.success);
        assert_eq!(report.steps[2].status, StepStatus::Warning);
        assert!(report.warnings.iter().any(|w| w.contains("permission denied")));
        assert!(entries(&journal).contains(&"publish".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_version_fails_without_retry() {
        let journal = journal();
        let mut steps = six_steps(&journal);
        let publish = steps.pop().unwrap().failing(|| PipelineError::VersionConflict {
            version: "1.2.0".to_string(),
        });
        steps.push(publish);

        let report = sequence(steps).run(&mut context("v1.2.0")).await;

        assert!(!report.success);
        assert_eq!(report.error_code.as_deref(), Some("VERSION_CONFLICT"));
        assert_eq!(report.rerunnable, Some(false));
        // Each step ran exactly once
        let ran = entries(&journal);
        for name in ["checkout", "runtime", "cache", "install", "build", "publish"] {
            assert_eq!(ran.iter().filter(|e| *e == name).count(), 1, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_invalid_tag_runs_nothing() {
        let journal = journal();
        let report = sequence(six_steps(&journal)).run(&mut context("latest")).await;

        assert!(!report.success);
        assert_eq!(report.error_code.as_deref(), Some("INVALID_EVENT"));
        assert!(entries(&journal).is_empty());
        assert!(report.steps.is_empty());
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let journal = journal();
        let mut steps = six_steps(&journal);
        steps[4] = FakeStep::ok("build", JobState::Building, &journal).slow(Duration::from_secs(5));

        let report = sequence(steps)
            .with_step_timeout(Some(Duration::from_millis(50)))
            .run(&mut context("v1.2.0"))
            .await;

        assert!(!report.success);
        assert_eq!(report.error_code.as_deref(), Some("TIMEOUT"));
        assert_eq!(report.failed_step().unwrap().name, "build");
    }

    #[tokio::test]
    async fn test_out_of_order_steps_are_rejected() {
        let journal = journal();
        let mut steps = six_steps(&journal);
        steps.swap(0, 1);

        let report = sequence(steps).run(&mut context("v1.2.0")).await;

        assert!(!report.success);
        assert_eq!(report.error_code.as_deref(), Some("INVALID_TRANSITION"));
        assert!(entries(&journal).is_empty());
    }

    #[tokio::test]
    async fn test_credential_never_reaches_report() {
        let journal = journal();
        let mut steps = six_steps(&journal);
        let publish = steps.pop().unwrap().failing(|| PipelineError::PublishFailed {
            message: "403 for token pypi-SECRET-123".to_string(),
        });
        steps.push(publish);

        let mut ctx = context("v1.2.0").with_redactor(Redactor::new(&["pypi-SECRET-123"]));
        let report = sequence(steps).run(&mut ctx).await;

        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("pypi-SECRET-123"));
        assert!(!report.render_summary().contains("pypi-SECRET-123"));
        assert!(json.contains("***"));
    }

    #[test]
    fn test_standard_plan() {
        let sequence = ReleaseSequence::standard(DependencyCache::new("/tmp/unused"), None);
        assert_eq!(
            sequence.plan(),
            vec!["checkout", "runtime", "cache", "install", "build", "publish"]
        );
    }
}
