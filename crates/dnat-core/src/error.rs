//! Error types for dnat-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Main error type for dnat-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Packet parsing failed
    #[error("Packet parsing error: {message}")]
    PacketParse {
        /// Detailed error message
        message: String,
        /// Offset in packet where error occurred
        offset: Option<usize>,
    },

    /// Packet is too small to process
    #[error("Packet too small: expected at least {expected} bytes, got {actual}")]
    PacketTooSmall {
        /// Minimum expected size
        expected: usize,
        /// Actual packet size
        actual: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path to the missing config file
        path: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Static mapping file rejected as a whole
    #[error("Malformed data in file '{path}' at line {line}: {reason}")]
    MalformedTable {
        /// File that was being loaded
        path: String,
        /// 1-based line number (0 when the whole file is at fault)
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// Invalid NAT range
    #[error("Invalid NAT range '{range}': {reason}")]
    InvalidRange {
        /// The rejected CIDR text
        range: String,
        /// Why it was rejected
        reason: String,
    },

    /// Socket bind, watch registration or kernel session could not be opened
    #[error("Resource error ({resource}): {message}")]
    Resource {
        /// Which resource failed
        resource: &'static str,
        /// Error message
        message: String,
    },

    /// A kernel request failed for this event only
    #[error("Kernel request '{operation}' failed: {message}")]
    Kernel {
        /// The request that failed
        operation: &'static str,
        /// Error message
        message: String,
    },

    /// Upstream DNS exchange failed
    #[error("Upstream DNS error for '{domain}': {reason}")]
    Upstream {
        /// Name being resolved
        domain: String,
        /// Failure reason
        reason: String,
    },

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS wire format error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a packet parse error
    pub fn packet_parse(message: impl Into<String>) -> Self {
        Self::PacketParse {
            message: message.into(),
            offset: None,
        }
    }

    /// Create a packet parse error with offset
    pub fn packet_parse_at(message: impl Into<String>, offset: usize) -> Self {
        Self::PacketParse {
            message: message.into(),
            offset: Some(offset),
        }
    }

    /// Create a config value error
    pub fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a malformed table error
    pub fn malformed(path: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedTable {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Create a resource error
    pub fn resource(resource: &'static str, message: impl Into<String>) -> Self {
        Self::Resource {
            resource,
            message: message.into(),
        }
    }

    /// Create a transient kernel error
    pub fn kernel(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Kernel {
            operation,
            message: message.into(),
        }
    }

    /// Create an upstream DNS error
    pub fn upstream(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Upstream {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must terminate the process when it reaches a worker loop
    ///
    /// Kernel and upstream failures only abandon the current event.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Kernel { .. } | Self::Upstream { .. } | Self::PacketParse { .. } | Self::PacketTooSmall { .. }
        )
    }

    /// Re-label the path of a malformed table error
    pub(crate) fn with_path(self, path: &str) -> Self {
        match self {
            Self::MalformedTable { line, reason, .. } => Self::MalformedTable {
                path: path.to_string(),
                line,
                reason,
            },
            other => other,
        }
    }
}
