//! Signature verification for the relay
//!
//! Parses Ed25519 public keys from PEM, decodes hex signatures and
//! verifies payload bytes exactly as submitted. Nothing here touches
//! the network, the disk or any shared state.

use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, VerifyingKey, SIGNATURE_LENGTH};
use sha2::{Digest, Sha256};

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Crypto operation errors
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid public key format: {0}")]
    InvalidPublicKey(String),
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
}

/// Outcome of checking a signature against a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Well-formed and cryptographically matching
    Valid,
    /// Well-formed but does not match key and payload
    Invalid,
    /// Not a 64-byte Ed25519 signature
    MalformedSignature,
}

/// Parse an Ed25519 public key from PEM (SubjectPublicKeyInfo)
pub fn parse_public_key_pem(pem: &str) -> CryptoResult<VerifyingKey> {
    let key = VerifyingKey::from_public_key_pem(pem.trim())
        .map_err(|e| CryptoError::InvalidPublicKey(format!("Invalid Ed25519 key: {}", e)))?;

    // Small-order points verify forged signatures under non-strict rules
    if key.is_weak() {
        return Err(CryptoError::InvalidPublicKey(
            "Ed25519 key is a small-order point".into(),
        ));
    }

    Ok(key)
}

/// Parse key material uploaded as raw bytes (must be UTF-8 PEM)
pub fn parse_public_key_bytes(bytes: &[u8]) -> CryptoResult<VerifyingKey> {
    let pem = std::str::from_utf8(bytes)
        .map_err(|_| CryptoError::InvalidPublicKey("Key file is not valid PEM text".into()))?;
    parse_public_key_pem(pem)
}

/// Decode a hex signature string into bytes
///
/// Only surrounding whitespace is stripped. Length is checked by
/// [`verify`], not here.
pub fn decode_signature_hex(signature_hex: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(signature_hex.trim())
        .map_err(|e| CryptoError::MalformedSignature(format!("Signature is not valid hex: {}", e)))
}

/// Verify `signature` over the exact `payload` bytes
pub fn verify(public_key: &VerifyingKey, payload: &[u8], signature: &[u8]) -> Verification {
    let sig_array: [u8; SIGNATURE_LENGTH] = match signature.try_into() {
        Ok(arr) => arr,
        Err(_) => return Verification::MalformedSignature,
    };
    let signature = Signature::from_bytes(&sig_array);

    match public_key.verify_strict(payload, &signature) {
        Ok(()) => Verification::Valid,
        Err(_) => Verification::Invalid,
    }
}

/// SHA256 fingerprint of a public key's raw bytes (hex encoded)
pub fn fingerprint(public_key: &VerifyingKey) -> String {
    sha256_hex(public_key.as_bytes())
}

/// Compute SHA256 hash of data (hex encoded)
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
