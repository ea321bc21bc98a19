//! Platform-specific errors

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Packet queue could not be opened or bound
    #[error("Queue initialization failed: {0}")]
    QueueInitFailed(String),

    /// Receiving from the packet queue failed
    #[error("Queue receive error: {0}")]
    QueueRecv(String),

    /// Issuing a verdict failed
    #[error("Verdict error: {0}")]
    Verdict(String),

    /// External tool could not be started
    #[error("Failed to run '{tool}': {source}")]
    ToolSpawn {
        /// Program name
        tool: &'static str,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// External tool exited unsuccessfully
    #[error("'{tool} {args}' failed ({status}): {stderr}")]
    ToolFailed {
        /// Program name
        tool: &'static str,
        /// Arguments, space separated
        args: String,
        /// Exit status description
        status: String,
        /// Trimmed standard error
        stderr: String,
    },

    /// Network interface does not exist
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// Set name rejected by the kernel limits
    #[error("Invalid set name '{name}': {reason}")]
    InvalidSetName {
        /// Rejected name
        name: String,
        /// Why
        reason: &'static str,
    },

    /// File watch could not be established
    #[error("Watch error on '{path}': {message}")]
    Watch {
        /// Watched path
        path: String,
        /// Error message
        message: String,
    },

    /// The watched file disappeared
    #[error("Watched file '{0}' removed")]
    WatchedFileRemoved(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Platform result type
pub type Result<T> = std::result::Result<T, PlatformError>;

impl From<PlatformError> for dnat_core::Error {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::QueueRecv(message) => dnat_core::Error::kernel("queue receive", message),
            PlatformError::Verdict(message) => dnat_core::Error::kernel("queue verdict", message),
            PlatformError::ToolFailed { tool, .. } | PlatformError::ToolSpawn { tool, .. } => {
                dnat_core::Error::kernel(tool, err.to_string())
            }
            PlatformError::QueueInitFailed(_) => dnat_core::Error::resource("packet queue", err.to_string()),
            PlatformError::Watch { .. } | PlatformError::WatchedFileRemoved(_) => {
                dnat_core::Error::resource("file watch", err.to_string())
            }
            PlatformError::InterfaceNotFound(_) | PlatformError::InvalidSetName { .. } => {
                dnat_core::Error::config_value("arguments", err.to_string())
            }
            PlatformError::Io(e) => dnat_core::Error::Io(e),
        }
    }
}
