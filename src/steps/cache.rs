//! Cache step - restore the dependency download cache, save it after success

use crate::cache::cache_key::CacheKey;
use crate::cache::dependency_cache::{DependencyCache, RestoreStatus, SaveStatus};
use crate::core::context::JobContext;
use crate::core::error::PipelineError;
use crate::core::state_machine::JobState;
use crate::core::traits::{Step, StepOutcome};
use async_trait::async_trait;

/// Restores the cache keyed by OS and manifest hash. Never fails the job.
#[derive(Debug)]
pub struct RestoreCacheStep {
    cache: DependencyCache,
}

impl RestoreCacheStep {
    pub fn new(cache: DependencyCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Step for RestoreCacheStep {
    fn name(&self) -> &str {
        "cache"
    }

    fn state(&self) -> JobState {
        JobState::RestoringCache
    }

    fn is_fatal(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut JobContext) -> Result<StepOutcome, PipelineError> {
        if !ctx.config.cache.enabled {
            return Ok(StepOutcome::new("disabled"));
        }

        let key = CacheKey::for_manifest(
            &ctx.runner_os,
            &ctx.config.cache.prefix,
            &ctx.manifest_path(),
        )
        .await?;
        ctx.cache_key = Some(key.clone());

        let status = self
            .cache
            .restore(&key, &ctx.cache_dir())
            .await
            .map_err(|e| PipelineError::CacheFailed {
                message: format!("restore failed: {}", e),
            })?;

        ctx.cache_hit = status.is_hit();
        match status {
            RestoreStatus::Hit { files } => {
                log::info!("Cache hit for {} ({} files)", key, files);
                Ok(StepOutcome::new(format!("hit {} ({} files)", key, files)))
            }
            RestoreStatus::Miss => {
                log::info!("Cache miss for {}", key);
                Ok(StepOutcome::new(format!("miss {}", key)))
            }
        }
    }

    async fn post(&self, ctx: &mut JobContext) -> Result<Option<String>, PipelineError> {
        let Some(key) = ctx.cache_key.clone() else {
            return Ok(None);
        };
        if !ctx.config.cache.enabled || ctx.cache_hit {
            return Ok(None);
        }

        let status = self
            .cache
            .save(&key, &ctx.cache_dir())
            .await
            .map_err(|e| PipelineError::CacheFailed {
                message: format!("save failed: {}", e),
            })?;

        let message = match status {
            SaveStatus::Saved { files } => format!("saved cache {} ({} files)", key, files),
            SaveStatus::AlreadyCached => format!("cache {} already saved", key),
            SaveStatus::NothingToSave => format!("nothing to cache for {}", key),
        };
        Ok(Some(message))
    }
}
