//! Bounded external command execution

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Longest stderr excerpt kept in errors
const MAX_STDERR: usize = 800;

#[derive(Error, Debug)]
pub(crate) enum CommandError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Captured output of a successful command
#[derive(Debug, Default)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` to completion; the child is killed if `timeout` elapses
pub(crate) async fn run<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    tracing::debug!(program, command = ?cmd.as_std(), "Running external command");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            return Err(CommandError::TimedOut {
                program: program.to_string(),
                timeout,
            })
        }
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(CommandError::NotFound(program.to_string()))
        }
        Ok(Err(e)) => {
            return Err(CommandError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })
        }
        Ok(Ok(output)) => output,
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: excerpt(&stderr),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= MAX_STDERR {
        return trimmed.to_string();
    }
    let start = (trimmed.len() - MAX_STDERR..trimmed.len())
        .find(|i| trimmed.is_char_boundary(*i))
        .unwrap_or(0);
    format!("...{}", &trimmed[start..])
}
