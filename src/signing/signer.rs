//! Ed25519 response signing.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{
    Signature, Signer as _, SigningKey, Verifier, VerifyingKey, KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
use thiserror::Error;

/// Errors raised while loading keys or producing/checking signatures.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to read signing key: {0}")]
    Io(#[from] std::io::Error),

    #[error("signing key has incorrect size: expected {expected}, got {actual}")]
    KeySize { expected: usize, actual: usize },

    #[error("signing key is invalid: {0}")]
    InvalidKey(String),

    #[error("signature is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("signature verification failed")]
    SignatureInvalid,
}

/// Produces a detached signature over a byte sequence.
pub trait Signer: Send + Sync {
    /// Sign `data`, returning the base64-encoded signature.
    fn sign(&self, data: &[u8]) -> Result<String, SigningError>;
}

/// Signer backed by an in-memory Ed25519 key pair.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Build from the 64-byte `seed || public key` encoding.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, SigningError> {
        let bytes: &[u8; KEYPAIR_LENGTH] =
            bytes.try_into().map_err(|_| SigningError::KeySize {
                expected: KEYPAIR_LENGTH,
                actual: bytes.len(),
            })?;
        let key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Read a private key file written by the provisioning step.
    pub fn load(path: &Path) -> Result<Self, SigningError> {
        let bytes = fs::read(path)?;
        Self::from_keypair_bytes(&bytes)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.key.verifying_key().as_bytes())
    }

    /// The 64-byte encoding persisted to disk.
    pub fn to_keypair_bytes(&self) -> [u8; KEYPAIR_LENGTH] {
        self.key.to_keypair_bytes()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, data: &[u8]) -> Result<String, SigningError> {
        let signature = self.key.sign(data);
        Ok(STANDARD.encode(signature.to_bytes()))
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}

/// Decode a raw 32-byte public key.
pub fn decode_public_key(bytes: &[u8]) -> Result<VerifyingKey, SigningError> {
    let bytes: &[u8; PUBLIC_KEY_LENGTH] =
        bytes.try_into().map_err(|_| SigningError::KeySize {
            expected: PUBLIC_KEY_LENGTH,
            actual: bytes.len(),
        })?;
    VerifyingKey::from_bytes(bytes).map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// Check a base64 signature produced by [`Ed25519Signer`].
pub fn verify_signature(
    key: &VerifyingKey,
    data: &[u8],
    signature_b64: &str,
) -> Result<(), SigningError> {
    let raw = STANDARD.decode(signature_b64)?;
    let raw: [u8; SIGNATURE_LENGTH] = raw
        .try_into()
        .map_err(|_| SigningError::SignatureInvalid)?;

    key.verify(data, &Signature::from_bytes(&raw))
        .map_err(|_| SigningError::SignatureInvalid)
}
