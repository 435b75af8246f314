//! Bounded execution of external commands.
//!
//! Every command run through this module has a deadline. The child process is
//! spawned with `kill_on_drop`, so a timed-out or cancelled call never leaves
//! the process running behind the caller's back.

// Standard library
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

// External crates
use tokio::process::Command;
use which::which;

use crate::error::{Result, VmError};

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Render a command line for logs and error messages.
pub fn describe_command<A: AsRef<OsStr>>(program: &str, args: &[A]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Run a command to completion and return its output whatever the exit status.
///
/// Fails only when the process cannot be started or the deadline passes.
pub async fn run_unchecked<A: AsRef<OsStr>>(
    program: &str,
    args: &[A],
    timeout: Duration,
) -> Result<CommandOutput> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| VmError::Spawn {
            command: describe_command(program, args),
            source,
        })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(VmError::Timeout {
                command: describe_command(program, args),
                secs: timeout.as_secs(),
            })
        }
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        code: output.status.code(),
    })
}

/// Run a command and return its trimmed stdout, failing on a non-zero exit.
pub async fn run_captured<A: AsRef<OsStr>>(
    program: &str,
    args: &[A],
    timeout: Duration,
) -> Result<String> {
    let output = run_unchecked(program, args, timeout).await?;

    if !output.success() {
        return Err(VmError::CommandFailed {
            command: describe_command(program, args),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(output.stdout.trim().to_string())
}

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}
