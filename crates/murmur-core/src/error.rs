//! Error types for the Murmur TTS service and client.

use crate::client::probe::CandidateFailure;

/// Result type alias for Murmur operations
pub type MurmurResult<T> = Result<T, MurmurError>;

/// Main error type for Murmur operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MurmurError {
    /// Malformed or empty synthesis input
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message describing the invalid input
        message: String,
    },

    /// A synthesis engine could not be loaded
    #[error("Model '{model}' unavailable: {message}")]
    ModelUnavailable {
        /// The model key that failed to load
        model: String,
        /// Error message from the loader
        message: String,
    },

    /// The engine raised while generating audio
    #[error("TTS synthesis failed: {message}")]
    SynthesisFailed {
        /// Error message describing the failure
        message: String,
    },

    /// Every endpoint candidate failed its probe
    #[error(
        "No endpoint reachable on port {port}: {}",
        summarize_failures(.failures)
    )]
    NoEndpointReachable {
        /// Port that was probed
        port: u16,
        /// Per-candidate failure reasons, in probing order
        failures: Vec<CandidateFailure>,
    },

    /// Request never produced an HTTP response
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// Server answered with a non-success status
    #[error("Server error ({status}): {message}")]
    Application {
        /// HTTP status code
        status: u16,
        /// Error message reported by the server
        message: String,
    },

    /// Timeout error
    #[error("Operation timed out: {message}")]
    Timeout {
        /// Error message describing the timeout
        message: String,
    },

    /// Retries exhausted; carries the last observed error
    #[error("Request failed after {attempts} attempt(s): {last}")]
    AttemptsExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Last error observed
        last: Box<MurmurError>,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// File I/O error
    #[error("File I/O error: {message}")]
    File {
        /// Error message describing the file operation failure
        message: String,
    },
}

fn summarize_failures(failures: &[CandidateFailure]) -> String {
    if failures.is_empty() {
        return "no candidates".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MurmurError {
    /// Create a new bad request error
    #[must_use]
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a new model unavailable error
    #[must_use]
    pub fn model_unavailable<M: Into<String>, S: Into<String>>(model: M, message: S) -> Self {
        Self::ModelUnavailable {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a new synthesis error
    #[must_use]
    pub fn synthesis<S: Into<String>>(message: S) -> Self {
        Self::SynthesisFailed {
            message: message.into(),
        }
    }

    /// Create a new no-endpoint-reachable error
    #[must_use]
    pub fn no_endpoint(port: u16, failures: Vec<CandidateFailure>) -> Self {
        Self::NoEndpointReachable { port, failures }
    }

    /// Create a new transport error
    #[must_use]
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new application error
    #[must_use]
    pub fn application<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Application {
            status,
            message: message.into(),
        }
    }

    /// Create a new timeout error
    #[must_use]
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Wrap the last error after the retry budget ran out
    #[must_use]
    pub fn attempts_exhausted(attempts: u32, last: Self) -> Self {
        Self::AttemptsExhausted {
            attempts,
            last: Box::new(last),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new file error
    #[must_use]
    pub fn file<S: Into<String>>(message: S) -> Self {
        Self::File {
            message: message.into(),
        }
    }

    /// Check if a client should reconnect and try again after this error
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Application { .. }
                | Self::Timeout { .. }
                | Self::NoEndpointReachable { .. }
        )
    }

    /// Check if this error is due to invalid user input
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::BadRequest { .. } | Self::Configuration { .. })
    }

    /// Get the error category for logging
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::SynthesisFailed { .. } => "synthesis",
            Self::NoEndpointReachable { .. } => "no_endpoint",
            Self::Transport { .. } => "transport",
            Self::Application { .. } => "application",
            Self::Timeout { .. } => "timeout",
            Self::AttemptsExhausted { .. } => "attempts_exhausted",
            Self::Configuration { .. } => "configuration",
            Self::File { .. } => "file",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for MurmurError {
    fn from(err: std::io::Error) -> Self {
        Self::file(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for MurmurError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::timeout(err.to_string())
    }
}

impl From<serde_json::Error> for MurmurError {
    fn from(err: serde_json::Error) -> Self {
        Self::file(format!("JSON serialization error: {err}"))
    }
}

impl From<toml::de::Error> for MurmurError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("Invalid TOML: {err}"))
    }
}

impl From<reqwest::Error> for MurmurError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Self::application(status.as_u16(), err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::probe::ProbeStage;

    #[test]
    fn test_error_creation() {
        let err = MurmurError::synthesis("Test synthesis error");
        assert_eq!(err.category(), "synthesis");
        assert!(!err.is_retriable());
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_error_display() {
        let err = MurmurError::model_unavailable("xtts", "weights missing");
        assert_eq!(err.to_string(), "Model 'xtts' unavailable: weights missing");

        let err = MurmurError::attempts_exhausted(3, MurmurError::transport("refused"));
        assert_eq!(
            err.to_string(),
            "Request failed after 3 attempt(s): Transport error: refused"
        );
    }

    #[test]
    fn test_no_endpoint_lists_every_candidate() {
        let err = MurmurError::no_endpoint(
            8090,
            vec![
                CandidateFailure::new("localhost", ProbeStage::Transport, "refused"),
                CandidateFailure::new("::1", ProbeStage::Liveness, "status starting"),
            ],
        );
        let text = err.to_string();
        assert!(text.contains("port 8090"));
        assert!(text.contains("localhost"));
        assert!(text.contains("transport"));
        assert!(text.contains("::1"));
        assert!(text.contains("liveness"));
    }

    #[test]
    fn test_retriable_errors() {
        assert!(MurmurError::transport("test").is_retriable());
        assert!(MurmurError::application(500, "test").is_retriable());
        assert!(MurmurError::timeout("test").is_retriable());
        assert!(MurmurError::no_endpoint(8090, Vec::new()).is_retriable());
        assert!(!MurmurError::bad_request("test").is_retriable());
        assert!(!MurmurError::synthesis("test").is_retriable());
        assert!(!MurmurError::attempts_exhausted(3, MurmurError::transport("x")).is_retriable());
    }

    #[test]
    fn test_user_errors() {
        assert!(MurmurError::bad_request("test").is_user_error());
        assert!(MurmurError::configuration("test").is_user_error());
        assert!(!MurmurError::synthesis("test").is_user_error());
        assert!(!MurmurError::transport("test").is_user_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err = MurmurError::from(io_err);
        assert!(matches!(err, MurmurError::File { .. }));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("port = ").unwrap_err();
        let err = MurmurError::from(toml_err);
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_error_equality() {
        let err1 = MurmurError::synthesis("test message");
        let err2 = MurmurError::synthesis("test message");
        let err3 = MurmurError::synthesis("different message");

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
