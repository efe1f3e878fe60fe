pub mod command_executor;
pub mod credential;

pub use command_executor::{CommandError, CommandOutput, SafeCommandExecutor};
pub use credential::{Credential, Redactor};
