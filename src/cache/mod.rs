//! Dependency cache keyed on the runner OS and the manifest digest

pub mod cache_key;
pub mod dependency_cache;

pub use cache_key::{CacheKey, runner_os};
pub use dependency_cache::{DependencyCache, RestoreStatus, SaveStatus};
