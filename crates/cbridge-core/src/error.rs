//! Bridge error types with rich context

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause attached to link errors.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Bridge error types organized by layer
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Remote Link Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Companion service is not available: {message}")]
    LinkUnavailable { message: String },

    #[error("Bind to companion service failed: {message}")]
    Bind {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("Unbind from companion service failed: {message}")]
    Unbind {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("Remote call failed: {message}")]
    Remote {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("Link protocol error: {message}")]
    Protocol { message: String },

    #[error("Link channel closed unexpectedly")]
    ChannelClosed,

    // ─────────────────────────────────────────────────────────────
    // Sync Bridge Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Key is read-only for external writers: {key}")]
    ReadOnlyKey { key: String },

    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Operation '{operation}' is not supported on path '{path}'")]
    UnsupportedOperation { operation: String, path: String },

    #[error("Unknown sync path: {path}")]
    UnknownPath { path: String },

    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },

    #[error("Invalid selection: {message}")]
    InvalidSelection { message: String },

    // ─────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Storage error: {message}")]
    Storage { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn link_unavailable(message: impl Into<String>) -> Self {
        Self::LinkUnavailable {
            message: message.into(),
        }
    }

    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
            source: None,
        }
    }

    /// Create a [`Error::Bind`] that wraps the underlying cause.
    pub fn bind_with(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::Bind {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn unbind(message: impl Into<String>) -> Self {
        Self::Unbind {
            message: message.into(),
            source: None,
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            source: None,
        }
    }

    /// Create a [`Error::Remote`] that wraps the underlying cause.
    pub fn remote_with(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::Remote {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn read_only(key: impl Into<String>) -> Self {
        Self::ReadOnlyKey { key: key.into() }
    }

    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub fn unsupported(operation: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            path: path.into(),
        }
    }

    pub fn unknown_path(path: impl Into<String>) -> Self {
        Self::UnknownPath { path: path.into() }
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    pub fn invalid_selection(message: impl Into<String>) -> Self {
        Self::InvalidSelection {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if the failed operation may succeed when attempted again later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::LinkUnavailable { .. }
                | Error::Bind { .. }
                | Error::Unbind { .. }
                | Error::Remote { .. }
                | Error::ChannelClosed
                | Error::Io(_)
        )
    }

    /// Check if this error is a permanent rejection that must not be retried
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::ReadOnlyKey { .. }
                | Error::UnsupportedOperation { .. }
                | Error::UnknownPath { .. }
                | Error::InvalidRecord { .. }
                | Error::InvalidSelection { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display_messages() {
        let err = Error::bind("platform rejected bind");
        assert_eq!(
            err.to_string(),
            "Bind to companion service failed: platform rejected bind"
        );

        let err = Error::read_only("bridge_last_sync_at");
        assert!(err.to_string().contains("bridge_last_sync_at"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_bind_with_keeps_cause() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::bind_with("connect", io_err);
        let source = err.source().expect("cause attached");
        assert!(source.to_string().contains("refused"));

        assert!(Error::bind("no cause").source().is_none());
    }

    #[test]
    fn test_read_only_is_distinct_from_not_found() {
        let read_only = Error::read_only("companion_flag");
        let missing = Error::key_not_found("companion_flag");

        assert!(matches!(read_only, Error::ReadOnlyKey { .. }));
        assert!(matches!(missing, Error::KeyNotFound { .. }));
        assert!(read_only.is_permanent());
        assert!(!missing.is_permanent());
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::bind("test").is_recoverable());
        assert!(Error::remote("test").is_recoverable());
        assert!(Error::ChannelClosed.is_recoverable());
        assert!(!Error::read_only("bridge_x").is_recoverable());
    }

    #[test]
    fn test_unsupported_operation_is_permanent() {
        let err = Error::unsupported("delete", "Settings");
        assert!(err.is_permanent());
        assert!(err.to_string().contains("delete"));
        assert!(err.to_string().contains("Settings"));
    }
}
