//! Secret reconstruction from committee recovery codes.
//!
//! The reconstruction primitive itself is pluggable. [`ChecksumReconstructor`]
//! is the built-in implementation: it validates each code's integrity and
//! requires every code to carry the same session key. It replicates the key
//! rather than splitting it, so any single code reveals it; deployments that
//! need threshold secrecy plug in a secret-sharing scheme instead.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::Identity;

/// Bytes of the SHA-256 digest kept as a per-code checksum.
const CHECKSUM_LEN: usize = 4;

/// A recovery code submitted by one committee member.
#[derive(Clone, PartialEq, Eq)]
pub struct RecoveryShare {
    pub identity: Identity,
    pub code: String,
}

impl RecoveryShare {
    pub fn new(identity: Identity, code: impl Into<String>) -> Self {
        Self {
            identity,
            code: code.into(),
        }
    }
}

impl fmt::Debug for RecoveryShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryShare")
            .field("identity", &self.identity)
            .field("code", &"<redacted>")
            .finish()
    }
}

/// A reconstructed secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ReconstructedSecret(Vec<u8>);

impl ReconstructedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ReconstructedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReconstructedSecret(<{} bytes>)", self.0.len())
    }
}

/// Error types for reconstruction.
#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    /// Code could not be parsed
    #[error("Malformed recovery code from {identity}: {reason}")]
    Malformed { identity: Identity, reason: String },

    /// Code failed its integrity check
    #[error("Recovery code from {0} failed checksum")]
    ChecksumMismatch(Identity),

    /// Primitive-specific refusal
    #[error("{0}")]
    Rejected(String),
}

/// Turns a quorum of recovery codes into the protected secret.
#[async_trait]
pub trait SecretReconstructor: Send + Sync {
    /// Reconstruct the secret for `original_request_id` from `shares`.
    async fn reconstruct(
        &self,
        original_request_id: &str,
        shares: &[RecoveryShare],
    ) -> Result<ReconstructedSecret, ReconstructionError>;
}

/// Built-in reconstructor for `hex(payload):hex(checksum)` codes.
///
/// Every member of a committee is issued the same payload (the session key).
/// The checksum binds a payload to the member it was issued to, so a code
/// replayed under another identity is rejected. Codes that disagree on the
/// payload are refused, so every quorum recovers the same secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumReconstructor;

impl ChecksumReconstructor {
    pub fn new() -> Self {
        Self
    }

    /// Issue the recovery code for `identity` carrying `payload`.
    pub fn issue_code(identity: &Identity, payload: &[u8]) -> String {
        format!("{}:{}", hex::encode(payload), hex::encode(checksum(identity, payload)))
    }

    fn verify(share: &RecoveryShare) -> Result<Vec<u8>, ReconstructionError> {
        let malformed = |reason: &str| ReconstructionError::Malformed {
            identity: share.identity.clone(),
            reason: reason.to_string(),
        };

        let (payload_hex, checksum_hex) = share
            .code
            .split_once(':')
            .ok_or_else(|| malformed("missing checksum separator"))?;
        let payload = hex::decode(payload_hex).map_err(|_| malformed("payload is not hex"))?;
        let expected = hex::decode(checksum_hex).map_err(|_| malformed("checksum is not hex"))?;
        if payload.is_empty() {
            return Err(malformed("empty payload"));
        }

        if expected != checksum(&share.identity, &payload) {
            return Err(ReconstructionError::ChecksumMismatch(share.identity.clone()));
        }
        Ok(payload)
    }
}

#[async_trait]
impl SecretReconstructor for ChecksumReconstructor {
    async fn reconstruct(
        &self,
        original_request_id: &str,
        shares: &[RecoveryShare],
    ) -> Result<ReconstructedSecret, ReconstructionError> {
        if shares.is_empty() {
            return Err(ReconstructionError::Rejected("no recovery codes supplied".to_string()));
        }

        let session_key = Self::verify(&shares[0])?;
        for share in &shares[1..] {
            if Self::verify(share)? != session_key {
                return Err(ReconstructionError::Rejected(format!(
                    "recovery code from {} disagrees with the quorum",
                    share.identity
                )));
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(original_request_id.as_bytes());
        hasher.update(&session_key);
        Ok(ReconstructedSecret::new(hasher.finalize().to_vec()))
    }
}

fn checksum(identity: &Identity, payload: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_str().as_bytes());
    hasher.update(payload);
    hasher.finalize()[..CHECKSUM_LEN].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(name: &str, payload: &[u8]) -> RecoveryShare {
        let identity = Identity::new(name);
        let code = ChecksumReconstructor::issue_code(&identity, payload);
        RecoveryShare::new(identity, code)
    }

    #[tokio::test]
    async fn test_reconstruct_is_order_independent() {
        let reconstructor = ChecksumReconstructor::new();
        let a = share("m1", b"session-key");
        let b = share("m2", b"session-key");
        let c = share("m3", b"session-key");

        let first = reconstructor
            .reconstruct("req-1", &[a.clone(), b.clone(), c.clone()])
            .await
            .unwrap();
        let second = reconstructor.reconstruct("req-1", &[c, a, b]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_bytes().len(), 32);
    }

    #[tokio::test]
    async fn test_any_quorum_recovers_same_secret() {
        let reconstructor = ChecksumReconstructor::new();
        let codes: Vec<_> = (1..=5)
            .map(|i| share(&format!("m{}", i), b"session-key"))
            .collect();

        let low = reconstructor.reconstruct("req-1", &codes[..3]).await.unwrap();
        let high = reconstructor.reconstruct("req-1", &codes[2..]).await.unwrap();
        assert_eq!(low, high);
    }

    #[tokio::test]
    async fn test_disagreeing_codes_rejected() {
        let reconstructor = ChecksumReconstructor::new();
        let shares = [
            share("m1", b"session-key"),
            share("m2", b"session-key"),
            share("m3", b"other-key"),
        ];

        let err = reconstructor.reconstruct("req-1", &shares).await.unwrap_err();
        assert!(matches!(err, ReconstructionError::Rejected(ref reason) if reason.contains("m3")));
    }

    #[tokio::test]
    async fn test_secret_bound_to_request() {
        let reconstructor = ChecksumReconstructor::new();
        let shares = [share("m1", b"session-key"), share("m2", b"session-key")];
        let a = reconstructor.reconstruct("req-1", &shares).await.unwrap();
        let b = reconstructor.reconstruct("req-2", &shares).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_replayed_code_fails_checksum() {
        let reconstructor = ChecksumReconstructor::new();
        let stolen = share("m1", b"alpha");
        let replayed = RecoveryShare::new(Identity::new("m2"), stolen.code);

        let err = reconstructor.reconstruct("req-1", &[replayed]).await.unwrap_err();
        assert!(matches!(err, ReconstructionError::ChecksumMismatch(id) if id == Identity::new("m2")));
    }

    #[tokio::test]
    async fn test_malformed_codes() {
        let reconstructor = ChecksumReconstructor::new();
        for code in ["no-separator", "zz:00", ":00000000", "616263:xyz"] {
            let bad = RecoveryShare::new(Identity::new("m1"), code);
            let err = reconstructor.reconstruct("req-1", &[bad]).await.unwrap_err();
            assert!(matches!(err, ReconstructionError::Malformed { .. }), "{}", code);
        }

        let err = reconstructor.reconstruct("req-1", &[]).await.unwrap_err();
        assert!(matches!(err, ReconstructionError::Rejected(_)));
    }

    #[test]
    fn test_debug_redacts() {
        let s = share("m1", b"alpha");
        assert!(!format!("{:?}", s).contains(&s.code));
        let secret = ReconstructedSecret::new(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", secret), "ReconstructedSecret(<3 bytes>)");
    }
}
