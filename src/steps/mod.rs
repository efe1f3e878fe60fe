//! The six stages of a release, in execution order

pub mod build;
pub mod cache;
pub mod checkout;
pub mod install;
pub mod publish;
pub mod runtime;

#[cfg(all(test, unix))]
pub(crate) mod testing;

pub use build::BuildStep;
pub use cache::RestoreCacheStep;
pub use checkout::CheckoutStep;
pub use install::InstallStep;
pub use publish::PublishStep;
pub use runtime::RuntimeStep;
