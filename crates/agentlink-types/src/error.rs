//! Shared error types and stable wire error codes.

use thiserror::Error;

/// Numeric error codes carried in RPC and A2A error envelopes.
pub mod codes {
    /// Malformed envelope or unsupported protocol version.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Unexpected internal failure.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A capability handler reported a business failure.
    pub const CAPABILITY_ERROR: i64 = -32000;
    /// Request body exceeds the configured maximum.
    pub const PAYLOAD_TOO_LARGE: i64 = -32096;
    /// Timestamp missing, unparseable or outside the replay window.
    pub const TIMESTAMP_INVALID: i64 = -32097;
    /// Signature present but not valid for the payload.
    pub const SIGNATURE_INVALID: i64 = -32098;
    /// Client exceeded its rate-limit window.
    pub const RATE_LIMITED: i64 = -32099;
}

/// Which authentication check rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Timestamp missing, malformed or outside the replay window.
    StaleTimestamp,
    /// Signature did not verify.
    BadSignature,
}

/// Top-level error type for AgentLink.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The envelope is malformed or uses an unsupported version.
    #[error("Invalid request: {0}")]
    Protocol(String),

    /// The requested method or peer does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication of the request failed.
    #[error("Authentication failed: {reason}")]
    Auth {
        /// Which check failed.
        failure: AuthFailure,
        /// Human-readable reason.
        reason: String,
    },

    /// The client exhausted its request budget for the current window.
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window resets.
        retry_after_secs: u64,
    },

    /// The request body is larger than allowed.
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Observed size (or a lower bound when streaming).
        size: u64,
        /// Configured maximum.
        max: u64,
    },

    /// A peer was unreachable or timed out.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A capability handler failed with a business error.
    #[error("Capability error: {message}")]
    Capability {
        /// Code reported by the handler or peer (defaults to -32000).
        code: i64,
        /// Error message safe to return to callers.
        message: String,
    },

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LinkError {
    /// Business failure with the default capability code.
    pub fn capability(message: impl Into<String>) -> Self {
        LinkError::Capability {
            code: codes::CAPABILITY_ERROR,
            message: message.into(),
        }
    }

    /// Stable numeric code for this error.
    pub fn code(&self) -> i64 {
        match self {
            LinkError::Protocol(_) => codes::INVALID_REQUEST,
            LinkError::NotFound(_) => codes::METHOD_NOT_FOUND,
            LinkError::Auth {
                failure: AuthFailure::StaleTimestamp,
                ..
            } => codes::TIMESTAMP_INVALID,
            LinkError::Auth {
                failure: AuthFailure::BadSignature,
                ..
            } => codes::SIGNATURE_INVALID,
            LinkError::RateLimited { .. } => codes::RATE_LIMITED,
            LinkError::PayloadTooLarge { .. } => codes::PAYLOAD_TOO_LARGE,
            LinkError::Capability { code, .. } => *code,
            LinkError::Transport(_)
            | LinkError::Config(_)
            | LinkError::Serialization(_)
            | LinkError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Message that may be returned across the wire.
    ///
    /// Internal failures are reduced to a generic message so that handler
    /// internals never reach the caller.
    pub fn public_message(&self) -> String {
        match self {
            LinkError::Transport(_)
            | LinkError::Config(_)
            | LinkError::Serialization(_)
            | LinkError::Internal(_) => "Internal error".to_string(),
            LinkError::Capability { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Serialization(e.to_string())
    }
}

/// Alias for Result with LinkError.
pub type LinkResult<T> = Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(LinkError::Protocol("v".into()).code(), -32600);
        assert_eq!(LinkError::NotFound("m".into()).code(), -32601);
        assert_eq!(LinkError::Internal("x".into()).code(), -32603);
        assert_eq!(LinkError::capability("nope").code(), -32000);
        assert_eq!(LinkError::PayloadTooLarge { size: 2, max: 1 }.code(), -32096);
        assert_eq!(
            LinkError::Auth {
                failure: AuthFailure::StaleTimestamp,
                reason: "old".into()
            }
            .code(),
            -32097
        );
        assert_eq!(
            LinkError::Auth {
                failure: AuthFailure::BadSignature,
                reason: "bad".into()
            }
            .code(),
            -32098
        );
        assert_eq!(
            LinkError::RateLimited {
                retry_after_secs: 3
            }
            .code(),
            -32099
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = LinkError::Internal("db password=hunter2".into());
        assert_eq!(err.public_message(), "Internal error");
        let err = LinkError::Transport("connect refused 10.0.0.3".into());
        assert_eq!(err.public_message(), "Internal error");
        assert_eq!(err.code(), codes::INTERNAL_ERROR);
    }

    #[test]
    fn test_capability_keeps_peer_code() {
        let err = LinkError::Capability {
            code: -32601,
            message: "Method not found".into(),
        };
        assert_eq!(err.code(), -32601);
        assert_eq!(err.public_message(), "Method not found");
    }
}
