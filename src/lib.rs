pub mod cache;
pub mod core;
pub mod orchestration;
pub mod registry;
pub mod security;
pub mod steps;

pub use crate::cache::{CacheKey, DependencyCache};
pub use crate::core::*;
pub use crate::orchestration::{JobReport, ReleaseSequence};
pub use crate::security::{CommandError, CommandOutput, Credential, Redactor, SafeCommandExecutor};
