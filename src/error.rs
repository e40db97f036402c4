//! Custom error types for kollaborate.
//!
//! This module provides structured error types so that the reconciliation
//! engine can tell transient session failures apart from fatal startup
//! problems without inspecting message text.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for kollaborate operations
#[derive(Error, Debug)]
pub enum KollabError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    /// Spec directory could not be created or read
    #[error("Spec directory unusable: {path}: {message}")]
    SpecDir { path: PathBuf, message: String },

    /// Missing required tool
    #[error("Missing required tool: {tool}")]
    MissingTool { tool: String },

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    /// Task id could not be parsed
    #[error("Invalid task id '{input}': {reason}")]
    InvalidTaskId { input: String, reason: String },

    /// Ledger could not be read or written
    #[error("Ledger error at {path}: {message}")]
    Ledger { path: PathBuf, message: String },

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Session name already taken
    #[error("Session '{name}' already exists")]
    SessionExists { name: String },

    /// Session does not exist
    #[error("Session '{name}' not found")]
    SessionNotFound { name: String },

    /// A session-manager call failed
    #[error("Session {operation} failed for '{name}': {message}")]
    Session {
        operation: String,
        name: String,
        message: String,
    },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KollabError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a ledger error
    pub fn ledger(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Ledger {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a session error
    pub fn session(
        operation: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Session {
            operation: operation.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is a transient external failure.
    ///
    /// Transient errors are logged and skipped; the next cycle re-derives
    /// state and naturally retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SessionExists { .. }
                | Self::SessionNotFound { .. }
                | Self::Session { .. }
                | Self::Ledger { .. }
                | Self::Io(_)
        )
    }

    /// Check if this error is fatal (only raised at startup)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingFile { .. }
                | Self::MissingTool { .. }
                | Self::SpecDir { .. }
                | Self::Config { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingFile { .. } | Self::MissingTool { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            Self::SpecDir { .. } => 8,
            _ => 1,
        }
    }
}

/// Type alias for kollaborate results
pub type Result<T> = std::result::Result<T, KollabError>;

/// Extension trait for converting foreign errors to KollabError
pub trait IntoKollabError<T> {
    fn into_kollab_session(self, operation: &str, name: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoKollabError<T> for std::result::Result<T, E> {
    fn into_kollab_session(self, operation: &str, name: &str) -> Result<T> {
        self.map_err(|e| KollabError::session(operation, name, e.into().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KollabError::SessionExists {
            name: "R12".into(),
        };
        assert_eq!(err.to_string(), "Session 'R12' already exists");
    }

    #[test]
    fn test_is_transient() {
        assert!(KollabError::session("kill", "R1", "boom").is_transient());
        assert!(KollabError::SessionNotFound { name: "R1".into() }.is_transient());
        assert!(!KollabError::MissingFile {
            path: PathBuf::from("TASKS.md")
        }
        .is_transient());
    }

    #[test]
    fn test_is_fatal() {
        assert!(KollabError::MissingFile {
            path: PathBuf::from("TASKS.md")
        }
        .is_fatal());
        assert!(KollabError::invalid_config("maxWorkers", "must be > 0").is_fatal());
        assert!(!KollabError::session("spawn", "F3", "tmux exited 1").is_fatal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            KollabError::MissingTool {
                tool: "tmux".into()
            }
            .exit_code(),
            6
        );
        assert_eq!(KollabError::config("bad").exit_code(), 7);
        assert_eq!(
            KollabError::SpecDir {
                path: PathBuf::from("specs"),
                message: "denied".into()
            }
            .exit_code(),
            8
        );
        assert_eq!(KollabError::session("list", "-", "x").exit_code(), 1);
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from("/proj/.kollaborate/settings.json");
        let err = KollabError::config_with_path("failed to parse", path.clone());
        if let KollabError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_into_kollab_session() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "tmux: not found",
        ));

        match result.into_kollab_session("create", "F3") {
            Err(KollabError::Session {
                operation,
                name,
                message,
            }) => {
                assert_eq!(operation, "create");
                assert_eq!(name, "F3");
                assert!(message.contains("tmux: not found"));
            }
            other => panic!("Wrong error variant after conversion: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: KollabError = io_err.into();
        assert!(matches!(err, KollabError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
