//! Unified error hierarchy for intervalrs
//!
//! Script and catalog failures are terminal for the load that triggered them;
//! nothing here is retried automatically.

use thiserror::Error;

/// Top-level error type for all intervalrs operations
#[derive(Debug, Error)]
pub enum IntervalError {
    /// Workout script or record errors
    #[error("Workout load error: {0}")]
    Script(#[from] ScriptError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Playback session errors (runner shut down, command rejected)
    #[error("Session error: {0}")]
    Session(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced while turning a workout source into a [`crate::models::Workout`]
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Document is not well-formed
    #[error("Malformed workout document: {reason}")]
    Malformed { reason: String },

    /// Document parsed but contained no usable intervals
    #[error("Workout document contains no intervals")]
    NoIntervals,

    /// Requested workout id is not present in the catalog
    #[error("Workout not found: {id}")]
    NotFound { id: String },

    /// File extension is not a known workout format
    #[error("Unsupported workout format: {format}")]
    UnsupportedFormat { format: String },
}

/// Result type alias for intervalrs operations
pub type Result<T> = std::result::Result<T, IntervalError>;

impl IntervalError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            IntervalError::Script(ScriptError::NotFound { .. }) => ErrorSeverity::Warning,
            IntervalError::Script(_) => ErrorSeverity::Warning,
            IntervalError::Json(_) => ErrorSeverity::Warning,
            IntervalError::Configuration(_) => ErrorSeverity::Error,
            IntervalError::Io(_) => ErrorSeverity::Error,
            IntervalError::Session(_) => ErrorSeverity::Critical,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            IntervalError::Script(ScriptError::Malformed { .. }) => {
                "Could not parse workout file.".to_string()
            }
            IntervalError::Script(ScriptError::NoIntervals) => {
                "Workout file does not contain any intervals.".to_string()
            }
            IntervalError::Script(ScriptError::NotFound { id }) => {
                format!("Workout {} could not be found.", id)
            }
            IntervalError::Json(_) => "Could not read workout record.".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Session can no longer be driven
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = IntervalError::Script(ScriptError::NoIntervals);
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = IntervalError::Session("runner stopped".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_user_messages() {
        let err = IntervalError::Script(ScriptError::Malformed {
            reason: "unexpected EOF".to_string(),
        });
        assert_eq!(err.user_message(), "Could not parse workout file.");

        let err = IntervalError::Script(ScriptError::NotFound {
            id: "42".to_string(),
        });
        assert!(err.user_message().contains("42"));
    }
}
