//! Engine error types
//!
//! Only recoverable failures live here. Caller bugs that could escalate
//! privileges (granting undeclared permissions, revoking non-revokable ones)
//! are assertions at the call site, not variants of this enum.

use thiserror::Error;

/// Errors that can occur in the permission engine
#[derive(Error, Debug)]
pub enum PermissionError {
    /// A host pattern failed to parse
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A URL failed to parse
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A URL has no usable origin (opaque origins such as `data:`)
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// Extension is not installed in this profile
    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    /// Propagation needs a tokio runtime and none is running
    #[error("No async runtime available for propagation")]
    NoRuntime,

    /// Preference store failure
    #[error("Preference store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PermissionError {
    /// Create a pattern parse error
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        PermissionError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        PermissionError::Store(msg.into())
    }
}

impl From<url::ParseError> for PermissionError {
    fn from(err: url::ParseError) -> Self {
        PermissionError::InvalidUrl(err.to_string())
    }
}

/// Result type alias for engine operations
pub type PermissionResult<T> = Result<T, PermissionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PermissionError::invalid_pattern("http://", "missing host");
        assert_eq!(err.to_string(), "Invalid pattern 'http://': missing host");

        let err = PermissionError::NoRuntime;
        assert_eq!(err.to_string(), "No async runtime available for propagation");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PermissionError = io_err.into();
        assert!(matches!(err, PermissionError::Io(_)));
    }

    #[test]
    fn test_error_from_url_parse() {
        let err: PermissionError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, PermissionError::InvalidUrl(_)));
    }
}
