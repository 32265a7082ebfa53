// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types
//!
//! Error types for the primitives bound to the clipboard protocol.
//!
//! ## Error Variants
//!
//! - **DecryptionFailed**: AEAD open failed (wrong key, tampered ciphertext, tag mismatch)
//! - **InvalidSignature**: Ed25519 signature malformed or not matching the message
//! - **InvalidKey**: Key material has the wrong size or is not a valid curve point
//! - **InvalidNonce**: Nonce size validation failed (XChaCha20 requires 24 bytes)
//! - **Other**: Generic error for library errors or unexpected failures
//!
//! Every variant carries the operation or key it relates to, so a log line
//! is enough to tell a stored-item failure from a stream-chunk failure.

use std::fmt;

/// Error type for all cryptographic operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD decryption failed
    ///
    /// This error occurs when:
    /// - Authentication tag verification fails (ciphertext tampered or wrong key)
    /// - AAD doesn't match
    DecryptionFailed {
        /// Which operation was being performed
        operation: String,
        /// Specific failure reason
        reason: String,
    },

    /// Ed25519 signature verification failed
    InvalidSignature {
        /// Which operation was being performed
        operation: String,
        /// Specific failure reason
        reason: String,
    },

    /// Invalid cryptographic key
    InvalidKey {
        /// Type of key that failed (e.g., "sign_pk", "encrypt_sk")
        key_type: String,
        /// Specific failure reason
        reason: String,
    },

    /// Invalid nonce size
    ///
    /// XChaCha20-Poly1305 requires exactly 24-byte nonces.
    InvalidNonce {
        expected_size: usize,
        actual_size: usize,
    },

    /// Generic error for library errors or unexpected failures
    Other(String),
}

impl CryptoError {
    pub fn decryption(operation: &str, reason: impl Into<String>) -> Self {
        CryptoError::DecryptionFailed {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub fn signature(operation: &str, reason: impl Into<String>) -> Self {
        CryptoError::InvalidSignature {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub fn key(key_type: &str, reason: impl Into<String>) -> Self {
        CryptoError::InvalidKey {
            key_type: key_type.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::DecryptionFailed { operation, reason } => {
                write!(f, "Decryption failed during {}: {}", operation, reason)
            }
            CryptoError::InvalidSignature { operation, reason } => {
                write!(f, "Invalid signature during {}: {}", operation, reason)
            }
            CryptoError::InvalidKey { key_type, reason } => {
                write!(f, "Invalid key ({}): {}", key_type, reason)
            }
            CryptoError::InvalidNonce {
                expected_size,
                actual_size,
            } => {
                write!(
                    f,
                    "Invalid nonce size: expected {} bytes, got {} bytes",
                    expected_size, actual_size
                )
            }
            CryptoError::Other(msg) => {
                write!(f, "Crypto error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CryptoError {}

// Conversion from chacha20poly1305 errors
impl From<chacha20poly1305::aead::Error> for CryptoError {
    fn from(err: chacha20poly1305::aead::Error) -> Self {
        CryptoError::DecryptionFailed {
            operation: "AEAD".to_string(),
            reason: format!("chacha20poly1305 error: {}", err),
        }
    }
}

// Conversion from ed25519 errors
impl From<ed25519_dalek::SignatureError> for CryptoError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CryptoError::InvalidSignature {
            operation: "ed25519".to_string(),
            reason: err.to_string(),
        }
    }
}
