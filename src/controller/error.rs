//! Error types for the upgrade run.
//!
//! Defines the error taxonomy shared by the reconciler, the source build
//! pipeline and the orchestrator, with classification for logging and
//! polling.

use std::time::Duration;
use thiserror::Error;

/// Error type for upgrade-test operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error (create/get/update/delete/patch failed)
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing or invalid configuration, or a resource expected to pre-exist is absent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A polled condition was not reached within its bound
    #[error("Timed out after {timeout:?} waiting for {resource}")]
    Timeout {
        /// Label of the resource being waited on
        resource: String,
        /// The bound that elapsed
        timeout: Duration,
    },

    /// The lifecycle manager reached a terminal phase without the data we need
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Transient error that may succeed on retry
    #[error("Transient error: {0}")]
    Transient(String),

    /// An external command exited unsuccessfully
    #[error("Command `{command}` failed with {}: {}", describe_exit(.code), .stderr.trim())]
    Command {
        /// The command line that was executed
        command: String,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// An install phase transition was attempted out of order
    #[error("Invalid install transition from {from} on {event}")]
    InvalidTransition {
        /// Phase the tracker was in
        from: String,
        /// Event that was rejected
        event: String,
    },

    /// The run was cancelled
    #[error("Cancelled while {0}")]
    Cancelled(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem or process I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error wrapped with the identity of the resource or command involved
    #[error("{context}: {source}")]
    Context {
        /// What was being done, naming the offending resource
        context: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl Error {
    /// Wrap this error with the identity of the resource or command involved.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error indicates the resource already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Error::Kube(kube::Error::Api(e)) if e.code == 409)
    }

    /// Check if this error is a polling timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Error::Timeout { .. })
    }

    /// Check if this error came from cancellation of the run
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled(_))
    }

    /// Short category name used in structured logs.
    pub fn category(&self) -> &'static str {
        match self.root() {
            Error::Configuration(_) => "configuration",
            Error::Timeout { .. } => "timeout",
            Error::ProtocolViolation(_) => "protocol_violation",
            Error::Kube(_) | Error::Transient(_) => "transient_api",
            Error::Command { .. } => "external_command",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Cancelled(_) => "cancelled",
            Error::Serialization(_) | Error::Yaml(_) => "serialization",
            Error::Io(_) => "io",
            Error::Context { .. } => "context",
        }
    }
}

/// Result type alias for upgrade-test operations
pub type Result<T> = std::result::Result<T, Error>;

/// Attach resource identity to the error of a `Result`.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a lazily built context message.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
