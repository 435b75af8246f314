use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmError {
    Config(String),
    Validation(String),
    Io(#[from] std::io::Error),
    Spawn {
        command: String,
        source: std::io::Error,
    },
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    Timeout {
        command: String,
        secs: u64,
    },
    Dependency(String),
    Serialization(String),
    Other(#[from] anyhow::Error),
}

impl Display for VmError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            VmError::Config(s) => write!(f, "Configuration error: {}", s),
            VmError::Validation(s) => write!(f, "Validation error: {}", s),
            VmError::Io(e) => write!(f, "I/O error: {}", e),
            VmError::Spawn { command, source } => {
                write!(f, "Failed to start command '{}': {}", command, source)
            }
            VmError::CommandFailed {
                command,
                code,
                stderr,
            } => {
                match code {
                    Some(code) => write!(f, "Command '{}' exited with status {}", command, code)?,
                    None => write!(f, "Command '{}' was terminated by a signal", command)?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            VmError::Timeout { command, secs } => {
                write!(f, "Command timed out after {}s: {}", secs, command)
            }
            VmError::Dependency(s) => write!(f, "Dependency not found: {}", s),
            VmError::Serialization(s) => write!(f, "Serialization error: {}", s),
            VmError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl From<serde_yaml_ng::Error> for VmError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        VmError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for VmError {
    fn from(err: serde_json::Error) -> Self {
        VmError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VmError>;
