/*!
Error types for the autosave engine.
*/

use thiserror::Error;

/// Result type used throughout the autosave core.
pub type Result<T> = std::result::Result<T, AutosaveError>;

/// Errors that can occur while configuring, saving or restoring.
#[derive(Error, Debug)]
pub enum AutosaveError {
    /// Invalid configuration; fatal at setup time
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage errors carrying the path that failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unparsable on-disk snapshot
    #[error("Format error: {0}")]
    Format(String),

    /// A single accessor failed to read or write its value
    #[error("Accessor error for '{key}': {source}")]
    Accessor {
        key: String,
        #[source]
        source: AccessorError,
    },

    /// On-disk key with no matching accessor
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// The background worker terminated abnormally
    #[error("Worker error: {0}")]
    Worker(String),
}

impl AutosaveError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    /// Wrap an accessor failure with the key it happened on
    pub fn accessor<S: Into<String>>(key: S, source: AccessorError) -> Self {
        Self::Accessor {
            key: key.into(),
            source,
        }
    }

    /// True for errors that must stop the process from proceeding.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Errors reported by an individual accessor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessorError {
    /// The variable cannot currently be read or written
    #[error("variable unavailable: {0}")]
    Unavailable(String),

    /// The value has the wrong shape for the variable
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// The variable refused the value
    #[error("value rejected: {0}")]
    Rejected(String),

    /// The variable has no such field
    #[error("unknown field: {0}")]
    UnknownField(String),
}
