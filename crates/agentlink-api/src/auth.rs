//! Timestamp and signature validation at the wire boundary.
//!
//! The timestamp check always runs first: a stale or unreadable timestamp is
//! rejected with `-32097` whatever the signature says. A signature, when
//! present, must verify against `(payload, agent_id)` through the configured
//! [`SignatureVerifier`]; a missing signature is accepted.

use agentlink_types::clock::{parse_timestamp_value, system_clock, SharedClock};
use agentlink_types::error::{AuthFailure, LinkError};
use agentlink_types::identity::SignatureVerifier;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// What a request presents for authentication.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    /// Claimed sender; empty when the request names none.
    pub agent_id: &'a str,
    pub timestamp: Option<&'a Value>,
    pub signature: Option<&'a str>,
    /// The part of the body the signature covers.
    pub payload: &'a Value,
}

/// Replay-window and signature checks.
pub struct AuthValidator {
    replay_window: Duration,
    verifier: Arc<dyn SignatureVerifier>,
    clock: SharedClock,
}

fn stale(reason: impl Into<String>) -> LinkError {
    LinkError::Auth {
        failure: AuthFailure::StaleTimestamp,
        reason: reason.into(),
    }
}

impl AuthValidator {
    /// Accept timestamps within `replay_window_secs` of now in either direction.
    pub fn new(replay_window_secs: i64, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            replay_window: Duration::seconds(replay_window_secs.max(0)),
            verifier,
            clock: system_clock(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Validate `creds`. With `require_timestamp` unset, a request that
    /// carries neither a timestamp nor a signature passes untouched.
    pub fn validate(&self, creds: &Credentials<'_>, require_timestamp: bool) -> Result<(), LinkError> {
        let signature = creds.signature.filter(|s| !s.is_empty());
        let timestamp = creds.timestamp.filter(|t| !t.is_null());
        if !require_timestamp && timestamp.is_none() && signature.is_none() {
            return Ok(());
        }

        let raw = timestamp.ok_or_else(|| stale("Missing timestamp"))?;
        let sent_at = parse_timestamp_value(raw).ok_or_else(|| stale("Unreadable timestamp"))?;
        let skew = self.clock.now() - sent_at;
        if skew > self.replay_window || -skew > self.replay_window {
            debug!(
                agent_id = creds.agent_id,
                skew_secs = skew.num_seconds(),
                "Timestamp outside replay window"
            );
            return Err(stale("Timestamp outside the replay window"));
        }

        if let Some(signature) = signature {
            if !self.verifier.verify(creds.agent_id, creds.payload, signature) {
                return Err(LinkError::Auth {
                    failure: AuthFailure::BadSignature,
                    reason: "Signature does not match payload".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_types::clock::{Clock, ManualClock};
    use agentlink_types::identity::{sign_payload, AgentVerifier, SharedSecretSigner};
    use serde_json::json;

    fn validator(clock: &ManualClock) -> AuthValidator {
        AuthValidator::new(300, Arc::new(AgentVerifier::new("s3cret"))).with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn test_valid_timestamp_without_signature() {
        let clock = ManualClock::default();
        let ts = json!(clock.now().to_rfc3339());
        let payload = json!({"x": 1});
        let creds = Credentials {
            agent_id: "a",
            timestamp: Some(&ts),
            signature: None,
            payload: &payload,
        };
        assert!(validator(&clock).validate(&creds, true).is_ok());
    }

    #[test]
    fn test_stale_timestamp_wins_over_good_signature() {
        let clock = ManualClock::default();
        let payload = json!({"x": 1});
        let sig = sign_payload(&SharedSecretSigner::new("a", "s3cret"), "a", &payload);
        let ts = json!((clock.now() - Duration::seconds(301)).timestamp_millis());
        let creds = Credentials {
            agent_id: "a",
            timestamp: Some(&ts),
            signature: Some(&sig),
            payload: &payload,
        };
        let err = validator(&clock).validate(&creds, true).unwrap_err();
        assert_eq!(err.code(), -32097);

        let future = json!((clock.now() + Duration::seconds(400)).to_rfc3339());
        let creds = Credentials {
            timestamp: Some(&future),
            ..creds
        };
        assert_eq!(validator(&clock).validate(&creds, false).unwrap_err().code(), -32097);
    }

    #[test]
    fn test_signature_checked_when_present() {
        let clock = ManualClock::default();
        let payload = json!({"x": 1});
        let ts = json!(clock.now().to_rfc3339());
        let good = sign_payload(&SharedSecretSigner::new("a", "s3cret"), "a", &payload);
        let creds = Credentials {
            agent_id: "a",
            timestamp: Some(&ts),
            signature: Some(&good),
            payload: &payload,
        };
        assert!(validator(&clock).validate(&creds, true).is_ok());

        let creds = Credentials {
            signature: Some("00ff"),
            ..creds
        };
        assert_eq!(validator(&clock).validate(&creds, true).unwrap_err().code(), -32098);
    }

    #[test]
    fn test_optional_when_nothing_presented() {
        let clock = ManualClock::default();
        let payload = json!({});
        let creds = Credentials {
            agent_id: "a",
            timestamp: None,
            signature: None,
            payload: &payload,
        };
        assert!(validator(&clock).validate(&creds, false).is_ok());
        assert_eq!(validator(&clock).validate(&creds, true).unwrap_err().code(), -32097);

        let garbage = json!("yesterday");
        let creds = Credentials {
            timestamp: Some(&garbage),
            ..creds
        };
        assert_eq!(validator(&clock).validate(&creds, false).unwrap_err().code(), -32097);
    }
}
