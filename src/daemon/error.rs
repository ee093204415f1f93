use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced at the daemon manager/multiplexer boundary
///
/// `Remote` carries the worker's failure text verbatim; interpreting it is
/// the job of the service adapters, not this layer.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The worker reported a failure for this call.
    #[error("daemon reported error: {0}")]
    Remote(String),

    /// Worker output could not be decoded into a response envelope.
    #[error("invalid daemon response: {0}")]
    InvalidResponse(String),

    /// The worker is not running and could not serve the call.
    #[error("daemon unavailable: {0}")]
    Unavailable(String),

    /// The worker entrypoint script could not be located.
    #[error("daemon worker script not found")]
    ScriptNotFound,

    /// The configured Python interpreter does not exist or cannot run.
    #[error("python interpreter not found at {}", .0.display())]
    PythonNotFound(PathBuf),

    /// The call deadline elapsed before a response arrived.
    #[error("daemon call timed out after {0:?}")]
    TimedOut(Duration),
}
