pub mod command;
pub mod error;
pub mod validation;

pub use command::{run_captured, run_unchecked, CommandOutput};
pub use error::{Result, VmError};
