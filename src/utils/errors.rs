// src/utils/errors.rs
//! Error types for the forwarder
//!
//! A single error enum covers every failure the pipeline can observe. The
//! `kind()` label is what metrics and diagnostics are keyed by.

use crate::delegate::Verb;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ForwarderError>;

/// Errors produced by the delegate gateway and the pipeline stages
#[derive(Debug, Error)]
pub enum ForwarderError {
    /// The delegate program could not be started (missing, not executable)
    #[error("failed to spawn delegate {program:?} for '{verb}': {source}")]
    DelegateSpawnFailure {
        program: PathBuf,
        verb: Verb,
        #[source]
        source: std::io::Error,
    },

    /// The delegate produced output that is not valid for the verb, or the
    /// payload could not be encoded
    #[error("delegate '{verb}' protocol error: {source}")]
    DelegateProtocolFailure {
        verb: Verb,
        #[source]
        source: serde_json::Error,
    },

    /// The delegate exited with a non-zero status
    #[error("delegate '{verb}' exited with {}: {output}", exit_code_label(.code))]
    DelegateExitFailure {
        verb: Verb,
        code: Option<i32>,
        output: String,
    },

    /// Pipe or wait failure while talking to a running delegate
    #[error("delegate '{verb}' I/O error: {source}")]
    DelegateIo {
        verb: Verb,
        #[source]
        source: std::io::Error,
    },

    /// The delegate did not finish within the configured timeout
    #[error("delegate '{verb}' timed out after {after:?}")]
    DelegateTimeout { verb: Verb, after: Duration },

    /// The request was cancelled while a delegate call was outstanding
    #[error("delegate '{verb}' cancelled")]
    Cancelled { verb: Verb },

    /// Propagated from the next stage downstream
    #[error("downstream failure: {0}")]
    DownstreamFailure(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl ForwarderError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ForwarderError::DelegateSpawnFailure { .. } => "spawn",
            ForwarderError::DelegateProtocolFailure { .. } => "protocol",
            ForwarderError::DelegateExitFailure { .. } => "exit",
            ForwarderError::DelegateIo { .. } => "io",
            ForwarderError::DelegateTimeout { .. } => "timeout",
            ForwarderError::Cancelled { .. } => "cancelled",
            ForwarderError::DownstreamFailure(_) => "downstream",
            ForwarderError::ConfigError(_) => "config",
        }
    }

    /// Verb of the delegate call that failed, if this is a delegate error
    pub fn verb(&self) -> Option<Verb> {
        match self {
            ForwarderError::DelegateSpawnFailure { verb, .. }
            | ForwarderError::DelegateProtocolFailure { verb, .. }
            | ForwarderError::DelegateExitFailure { verb, .. }
            | ForwarderError::DelegateIo { verb, .. }
            | ForwarderError::DelegateTimeout { verb, .. }
            | ForwarderError::Cancelled { verb } => Some(*verb),
            ForwarderError::DownstreamFailure(_) | ForwarderError::ConfigError(_) => None,
        }
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}

impl From<config::ConfigError> for ForwarderError {
    fn from(err: config::ConfigError) -> Self {
        ForwarderError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_failure_display() {
        let err = ForwarderError::DelegateExitFailure {
            verb: Verb::Request,
            code: Some(3),
            output: "no such bridge".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "delegate 'request' exited with status 3: no such bridge"
        );
        assert_eq!(err.kind(), "exit");
        assert_eq!(err.verb(), Some(Verb::Request));
    }

    #[test]
    fn test_signal_exit_display() {
        let err = ForwarderError::DelegateExitFailure {
            verb: Verb::Close,
            code: None,
            output: String::new(),
        };
        assert!(err.to_string().contains("killed by signal"));
    }

    #[test]
    fn test_downstream_has_no_verb() {
        let err = ForwarderError::DownstreamFailure("peer unreachable".into());
        assert_eq!(err.verb(), None);
        assert_eq!(err.kind(), "downstream");
    }
}
