//! Error types for the render pipeline.
//!
//! Two families are distinguished on purpose: [`UserError`] carries a
//! message that is shown to the requester verbatim and never retried,
//! while [`SandboxError`] covers failures of the orchestration layer
//! itself (the Docker daemon, the filesystem, the wait stream). Script
//! failures inside the sandbox are not errors at this level at all; they
//! travel back as captured diagnostics in a successful engine result.

use thiserror::Error;

/// A failure whose message is the reply shown to the requester.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct UserError(pub String);

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The reply text for this failure.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Failure to load or validate the configuration file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

/// Failure of the sandbox orchestration layer.
///
/// These are the only failures surfaced to operators rather than the
/// requester; the user sees a generic message with the detail attached
/// as a log file.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Docker client error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("I/O error during sandbox operation: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not create sandbox work directory: {0}")]
    WorkDir(String),
    #[error("container wait stream ended unexpectedly")]
    WaitInterrupted,
}
