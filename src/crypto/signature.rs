// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ed25519 Publisher Signatures
//!
//! Copies are signed over their payload (`key-id ‖ nonce ‖ ciphertext`);
//! streams are signed over the final transcript hash. Verification uses
//! `verify_strict` so malleable encodings are rejected.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use super::error::CryptoError;

/// Detached signature size in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Sign `message`, returning the raw 64-byte signature
pub fn sign_message(signing_key: &SigningKey, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    signing_key.sign(message).to_bytes()
}

/// Verify a raw 64-byte signature over `message`
///
/// # Errors
///
/// Returns `CryptoError::InvalidSignature` tagged with `operation` when the
/// signature does not match.
pub fn verify_message(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
    operation: &str,
) -> Result<(), CryptoError> {
    let signature = Signature::from_bytes(signature);
    verifying_key
        .verify_strict(message, &signature)
        .map_err(|e| CryptoError::signature(operation, e.to_string()))
}

/// Parse a 32-byte Ed25519 verifying key
pub fn parse_verifying_key(bytes: &[u8]) -> Result<VerifyingKey, CryptoError> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::key("sign_pk", format!("expected 32 bytes, got {}", bytes.len())))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::key("sign_pk", e.to_string()))
}

/// Build a signing key from its 32-byte seed
pub fn parse_signing_key(bytes: &[u8]) -> Result<SigningKey, CryptoError> {
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::key("sign_sk", format!("expected 32 bytes, got {}", bytes.len())))?;
    Ok(SigningKey::from_bytes(&seed))
}
