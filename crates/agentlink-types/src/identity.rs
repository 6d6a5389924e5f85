//! Agent identity and payload signing.
//!
//! Heartbeats and A2A messages carry an opaque `(identifier, signature)` pair.
//! The scheme is pluggable: a [`Signer`] produces signatures and a
//! [`SignatureVerifier`] checks them against `(payload, agent_id)`.
//!
//! Two schemes ship here:
//! - [`SharedSecretSigner`]: HMAC-SHA256 keyed by a pre-shared secret. Both
//!   sides compute the same MAC, which only works among parties holding the
//!   secret.
//! - [`Ed25519Signer`]: asymmetric signatures with a `did:key`-style
//!   identifier that embeds the public key, so any party can verify.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of identifiers produced by [`Ed25519Signer`].
pub const DID_KEY_PREFIX: &str = "did:key:ed25519:";

/// Produces signatures on behalf of the local agent.
pub trait Signer: Send + Sync {
    /// Self-describing identifier attached next to every signature.
    fn identifier(&self) -> String;

    /// Sign arbitrary bytes, returning a hex-encoded signature.
    fn sign(&self, data: &[u8]) -> String;
}

/// Checks a signature presented by a remote agent.
pub trait SignatureVerifier: Send + Sync {
    /// Whether `signature` is valid for `payload` sent by `agent_id`.
    fn verify(&self, agent_id: &str, payload: &serde_json::Value, signature: &str) -> bool;
}

/// Canonical bytes that are signed for a `(payload, agent_id)` pair.
///
/// `serde_json` serializes object keys in sorted order, so both sides derive
/// the same bytes from equal values.
pub fn signing_input(agent_id: &str, payload: &serde_json::Value) -> Vec<u8> {
    let body = serde_json::to_string(payload).unwrap_or_default();
    format!("{agent_id}\n{body}").into_bytes()
}

/// Sign a `(payload, agent_id)` pair with any signer.
pub fn sign_payload(signer: &dyn Signer, agent_id: &str, payload: &serde_json::Value) -> String {
    signer.sign(&signing_input(agent_id, payload))
}

/// HMAC-SHA256 signer/verifier over a pre-shared secret.
#[derive(Clone)]
pub struct SharedSecretSigner {
    agent_id: String,
    secret: String,
}

impl SharedSecretSigner {
    /// Create a signer for `agent_id` keyed by `secret`.
    pub fn new(agent_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            secret: secret.into(),
        }
    }

    fn mac(&self, data: &[u8]) -> String {
        let mut mac = match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(m) => m,
            Err(_) => return String::new(),
        };
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for SharedSecretSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretSigner")
            .field("agent_id", &self.agent_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Signer for SharedSecretSigner {
    fn identifier(&self) -> String {
        self.agent_id.clone()
    }

    fn sign(&self, data: &[u8]) -> String {
        self.mac(data)
    }
}

impl SignatureVerifier for SharedSecretSigner {
    fn verify(&self, agent_id: &str, payload: &serde_json::Value, signature: &str) -> bool {
        let expected = self.mac(&signing_input(agent_id, payload));
        if expected.is_empty() {
            return false;
        }
        subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), signature.as_bytes()).into()
    }
}

/// Ed25519 identity for the local agent.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Restore an identity from a hex-encoded 32-byte secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, String> {
        let bytes = hex::decode(secret_hex.trim()).map_err(|e| format!("invalid hex: {e}"))?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| "invalid secret key length (expected 32 bytes)".to_string())?;
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    /// Hex-encoded secret key, for persisting the identity.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    /// Verify a signature produced by the identity named `identifier`.
    pub fn verify_with_identifier(
        identifier: &str,
        data: &[u8],
        signature_hex: &str,
    ) -> Result<(), String> {
        let pk_hex = identifier
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| format!("not an ed25519 identifier: {identifier}"))?;
        let pk_bytes: [u8; 32] = hex::decode(pk_hex)
            .map_err(|e| format!("invalid public key hex: {e}"))?
            .as_slice()
            .try_into()
            .map_err(|_| "invalid public key length (expected 32 bytes)".to_string())?;
        let verifying_key =
            VerifyingKey::from_bytes(&pk_bytes).map_err(|e| format!("invalid public key: {e}"))?;

        let sig_bytes: [u8; 64] = hex::decode(signature_hex)
            .map_err(|e| format!("invalid signature hex: {e}"))?
            .as_slice()
            .try_into()
            .map_err(|_| "invalid signature length (expected 64 bytes)".to_string())?;
        let signature = Signature::from_bytes(&sig_bytes);

        verifying_key
            .verify(data, &signature)
            .map_err(|e| format!("signature verification failed: {e}"))
    }
}

impl Signer for Ed25519Signer {
    fn identifier(&self) -> String {
        format!(
            "{DID_KEY_PREFIX}{}",
            hex::encode(self.key.verifying_key().to_bytes())
        )
    }

    fn sign(&self, data: &[u8]) -> String {
        hex::encode(self.key.sign(data).to_bytes())
    }
}

/// Verifies Ed25519 signatures where the agent id is a `did:key` identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DidKeyVerifier;

impl SignatureVerifier for DidKeyVerifier {
    fn verify(&self, agent_id: &str, payload: &serde_json::Value, signature: &str) -> bool {
        Ed25519Signer::verify_with_identifier(agent_id, &signing_input(agent_id, payload), signature)
            .is_ok()
    }
}

/// Verifier used at the wire boundary.
///
/// `did:key` senders are verified against the key embedded in their id;
/// everyone else against the shared secret, when one is configured. A
/// signature that cannot be checked at all is rejected.
#[derive(Debug, Clone, Default)]
pub struct AgentVerifier {
    shared: Option<SharedSecretSigner>,
}

impl AgentVerifier {
    /// Build a verifier; an empty `shared_secret` disables HMAC verification.
    pub fn new(shared_secret: &str) -> Self {
        Self {
            shared: (!shared_secret.is_empty())
                .then(|| SharedSecretSigner::new(String::new(), shared_secret)),
        }
    }
}

impl SignatureVerifier for AgentVerifier {
    fn verify(&self, agent_id: &str, payload: &serde_json::Value, signature: &str) -> bool {
        if agent_id.starts_with(DID_KEY_PREFIX) {
            return DidKeyVerifier.verify(agent_id, payload, signature);
        }
        match &self.shared {
            Some(shared) => shared.verify(agent_id, payload, signature),
            None => false,
        }
    }
}
