//! Error types owned by the binary.
//!
//! Everything else travels as `anyhow::Error`; `main` downcasts to decide
//! the exit code and what to print.

use thiserror::Error;

/// Bad command line. Exits with code 2.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("missing required argument --{0}")]
    MissingArgument(String),

    #[error("invalid value '{value}' for --{name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Failure of an SSH channel (not of the remote command).
#[derive(Debug, Error)]
pub enum SshError {
    #[error("failed to start ssh for {host}: {source}")]
    Spawn {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ssh connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },
}

/// Exit code for an error: 2 for usage errors, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.downcast_ref::<UsageError>().is_some()) {
        2
    } else {
        1
    }
}

/// API payload carried by an error, if any
pub fn api_payload(err: &anyhow::Error) -> Option<&serde_json::Value> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<cmpkit::Error>()
            .and_then(cmpkit::Error::as_api)
            .or_else(|| cause.downcast_ref::<cmpkit::ApiError>())
            .and_then(|api| api.payload.as_ref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use serde_json::json;

    #[test]
    fn test_exit_code_usage() {
        let err = anyhow::Error::new(UsageError::MissingArgument("id".into()));
        assert_eq!(exit_code(&err), 2);
        assert_eq!(err.to_string(), "missing required argument --id");
    }

    #[test]
    fn test_exit_code_usage_behind_context() {
        let result: Result<(), UsageError> = Err(UsageError::Other("bad".into()));
        let err = result.context("parsing").unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn test_exit_code_runtime() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&err), 1);
        let err = anyhow::Error::new(cmpkit::Error::from(cmpkit::ApiError::from_status(500, "")));
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_api_payload() {
        let api = cmpkit::ApiError::from_status(409, r#"{"message":"exists","code":409}"#);
        let err = anyhow::Error::new(cmpkit::Error::from(api));
        assert_eq!(api_payload(&err), Some(&json!({"message":"exists","code":409})));
        assert!(api_payload(&anyhow::anyhow!("plain")).is_none());
    }
}
