use std::time::Duration;
use thiserror::Error;

/// Errors raised while running a command or script against a repository
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` {}: {stderr}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Empty command")]
    EmptyCommand,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

impl TransportError {
    /// Output a failed command left behind, for user-facing messages
    pub fn detail(&self) -> String {
        match self {
            TransportError::CommandFailed { stderr, .. } if !stderr.is_empty() => stderr.clone(),
            other => other.to_string(),
        }
    }
}
