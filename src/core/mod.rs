pub mod config;
pub mod config_loader;
pub mod context;
pub mod error;
pub mod event;
pub mod state_machine;
pub mod traits;

pub use config::PipelineConfig;
pub use config_loader::{CONFIG_FILENAME, ConfigLoadOptions, ConfigLoader, ConfigOverrides};
pub use context::JobContext;
pub use error::PipelineError;
pub use event::ReleaseEvent;
pub use state_machine::{JobState, JobStateMachine};
pub use traits::{Step, StepOutcome};
