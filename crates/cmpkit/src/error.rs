//! Error types for CMP client operations.
//!
//! Every failure the core can surface is one of a small set of kinds:
//! configuration, authentication, API, task and I/O errors. The API client
//! folds transport and protocol failures into [`ApiError`] so command
//! handlers only ever match on one shape for remote problems.

use serde_json::Value;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for CMP client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Code attached to an [`ApiError`].
///
/// Carries the HTTP status when one was received, otherwise a synthetic
/// code describing where the exchange broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCode {
    /// The server answered with this HTTP status.
    Http(u16),
    /// The request never produced a response (DNS, connect, TLS, timeout).
    Network,
    /// A response arrived but its body could not be decoded.
    Decode,
}

impl ApiCode {
    /// HTTP status, if this code carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(status) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ApiCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(status) => write!(f, "{status}"),
            Self::Network => write!(f, "NETWORK"),
            Self::Decode => write!(f, "DECODE"),
        }
    }
}

/// Structured error for anything that went wrong talking to the CMP.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ApiError {
    /// HTTP status or synthetic code.
    pub code: ApiCode,
    /// One-line human readable message.
    pub message: String,
    /// Decoded response body, when there was one.
    pub payload: Option<Value>,
}

impl ApiError {
    /// Create an error from an HTTP status and the raw response body.
    ///
    /// The message is taken from the conventional `message`/`description`
    /// keys of a JSON body when present.
    pub fn from_status(status: u16, body: &str) -> Self {
        let payload: Option<Value> = serde_json::from_str(body).ok();
        let message = payload
            .as_ref()
            .and_then(|p| {
                ["message", "description", "error_description", "error"]
                    .iter()
                    .find_map(|k| p.get(*k).and_then(Value::as_str))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("HTTP {status}")
                } else {
                    trimmed.lines().next().unwrap_or_default().to_string()
                }
            });

        Self {
            code: ApiCode::Http(status),
            message,
            payload,
        }
    }

    /// Create a network error (no response received).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            code: ApiCode::Network,
            message: message.into(),
            payload: None,
        }
    }

    /// Create a decode error (response could not be parsed).
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            code: ApiCode::Decode,
            message: message.into(),
            payload: None,
        }
    }

    /// HTTP status, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.code.status()
    }

    /// Whether this error means the requested object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Terminal failures of a remote task.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The task reached `FAILURE`; `trace` holds the remote trace message.
    #[error("task {id} failed: {trace}")]
    Failure {
        /// Task identifier.
        id: String,
        /// Trace retrieved from the companion endpoint.
        trace: String,
    },

    /// The task did not reach a terminal status before the deadline.
    #[error("task {id} timed out after {}s", elapsed.as_secs())]
    Timeout {
        /// Task identifier.
        id: String,
        /// Time spent polling.
        elapsed: Duration,
    },
}

/// Errors that can occur in the CMP client core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No configuration file exists for the environment.
    #[error("configuration not found: {}", path.display())]
    ConfigNotFound {
        /// Path that was probed.
        path: PathBuf,
    },

    /// The configuration file is missing required keys or is malformed.
    #[error("invalid configuration for environment {env}: {reason}")]
    ConfigInvalid {
        /// Environment name.
        env: String,
        /// What is wrong.
        reason: String,
    },

    /// An encrypted field could not be decrypted.
    #[error("cannot decrypt configuration field {field}: {reason}")]
    ConfigDecrypt {
        /// Dotted path of the field.
        field: String,
        /// Underlying reason.
        reason: String,
    },

    /// No usable credentials, or credentials rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Remote call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Remote task failed or timed out.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// IO error with path context.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// YAML parsing failure.
    #[error("YAML error in {}: {source}", path.display())]
    Yaml {
        /// File being parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The inner [`ApiError`], if this is an API failure.
    #[must_use]
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this is an API error with HTTP 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.as_api().is_some_and(ApiError::is_not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_code_display() {
        assert_eq!(ApiCode::Http(404).to_string(), "404");
        assert_eq!(ApiCode::Network.to_string(), "NETWORK");
        assert_eq!(ApiCode::Decode.to_string(), "DECODE");
    }

    #[test]
    fn test_from_status_uses_json_message() {
        let err = ApiError::from_status(400, r#"{"code": 400, "message": "bad name"}"#);
        assert_eq!(err.code, ApiCode::Http(400));
        assert_eq!(err.message, "bad name");
        assert!(err.payload.is_some());
    }

    #[test]
    fn test_from_status_plain_body() {
        let err = ApiError::from_status(502, "Bad Gateway\n<html>");
        assert_eq!(err.message, "Bad Gateway");
        assert!(err.payload.is_none());

        let empty = ApiError::from_status(500, "");
        assert_eq!(empty.message, "HTTP 500");
    }

    #[test]
    fn test_not_found() {
        let err: Error = ApiError::from_status(404, "").into();
        assert!(err.is_not_found());
        let err: Error = ApiError::network("refused").into();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_display_single_line() {
        let err = ApiError::from_status(409, r#"{"message": "already exists"}"#);
        assert_eq!(err.to_string(), "[409] already exists");
    }
}
