//! Error types for the gateway crate.
//!
//! Every gateway operation returns `Report<GatewayError>`; callers decide
//! how to present it using [`GatewayError::is_retryable`].

use std::fmt;

/// Errors from talking to the persistence service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The request never produced a response (connect, timeout, I/O).
    Transport { reason: String },
    /// The service answered with a non-success HTTP status.
    Status { code: u16, message: String },
    /// The requested workflow does not exist.
    NotFound { resource: String },
    /// The service answered, but the body could not be decoded.
    Decode { reason: String },
    /// The service refused the request (envelope code other than 0).
    Rejected { code: i64, message: String },
    /// The gateway configuration is unusable.
    InvalidConfig { reason: String },
}

impl GatewayError {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { reason } => write!(f, "request failed: {reason}"),
            Self::Status { code, message } => write!(f, "server returned {code}: {message}"),
            Self::NotFound { resource } => write!(f, "not found: {resource}"),
            Self::Decode { reason } => write!(f, "failed to decode response: {reason}"),
            Self::Rejected { code, message } => {
                write!(f, "request rejected (code {code}): {message}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid gateway config: {reason}"),
        }
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_server_errors_are_retryable() {
        assert!(
            GatewayError::Transport {
                reason: "connection refused".to_string()
            }
            .is_retryable()
        );
        assert!(
            GatewayError::Status {
                code: 503,
                message: "unavailable".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(
            !GatewayError::Status {
                code: 400,
                message: "bad".to_string()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::NotFound {
                resource: "workflow wf_1".to_string()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::Decode {
                reason: "eof".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn rejected_display_includes_code() {
        let err = GatewayError::Rejected {
            code: -1,
            message: "Workflow not found".to_string(),
        };
        assert!(err.to_string().contains("code -1"));
    }
}
