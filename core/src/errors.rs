//! Errors returned by the control surface.
//!
//! Only control-plane operations fail with these; data-path conditions (parse
//! failures, ring pressure) are reported through [statistics](crate::stats)
//! instead.

use thiserror::Error;

/// Error taxonomy for engine control operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is missing or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Insufficient privilege to bind the interface or map the queue region.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The named NIC does not exist on this host.
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    /// The platform rejected the packet channel.
    #[error("attach failed: {0}")]
    AttachFailed(String),

    /// A queue region or worker thread could not be allocated.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The operation requires a freshly initialized engine.
    #[error("engine not initialized")]
    NotInitialized,

    /// The operation is not permitted while the engine is running.
    #[error("engine already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, Error>;
