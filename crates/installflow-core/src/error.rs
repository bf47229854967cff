//! Runtime error type for the install engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::phase::InstallPhase;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read from {program}: {source}")]
    Read {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("event forwarder exited before reporting an endpoint")]
    ForwarderEndpoint,
    #[error("event forwarder reported an invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("no background worker threads could be started")]
    NoWorkers,
    #[error("background task panicked: {0}")]
    TaskPanicked(String),
    #[error("event loop is no longer running")]
    LoopClosed,
    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: InstallPhase, to: InstallPhase },
    #[error("postinstall requested before its configuration was written")]
    PostinstallNotConfigured,
    #[error("{command} exited with status {code}")]
    CommandFailed {
        command: String,
        code: i32,
        /// Captured stderr, sanitized and capped for logs.
        stderr: String,
    },
}
