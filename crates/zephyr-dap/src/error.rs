//! Debug adapter error type
//!
//! Every request handler returns `DebugResult`; failures become DAP error
//! responses and are logged. Errors never cross onto the VM thread, whose
//! hot path logs anomalies and carries on.

use thiserror::Error;

/// Errors surfaced by the debug adapter.
#[derive(Debug, Error)]
pub enum DebugError {
    /// The requested script/source is not in the cache and cannot be resolved.
    #[error("script is not loaded: {0}")]
    NotLoaded(String),

    /// A function breakpoint name is malformed or does not resolve.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A frameId / variablesReference / threadId does not resolve.
    #[error("invalid handle: {0}")]
    InvalidHandle(i64),

    /// The request is recognized but intentionally not supported.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// The operation is not valid in the current execution state.
    #[error("could not {0} in the current execution state")]
    InvalidState(&'static str),

    /// A node failed to serialize into its protocol form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The client closed the connection.
    #[error("client disconnected")]
    Disconnected,

    /// Transport failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed configuration file.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type DebugResult<T> = Result<T, DebugError>;
