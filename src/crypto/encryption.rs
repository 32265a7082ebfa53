// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! XChaCha20-Poly1305 Encryption/Decryption
//!
//! Authenticated encryption for both clipboard items and stream chunks. The
//! server never calls into this module: it only relays sealed bytes.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

use super::error::CryptoError;

/// Symmetric key size in bytes
pub const KEY_SIZE: usize = 32;
/// XChaCha20 nonce size in bytes
pub const NONCE_SIZE: usize = 24;
/// Poly1305 tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

/// Decrypt data using XChaCha20-Poly1305 AEAD
///
/// # Arguments
///
/// * `ciphertext` - Encrypted data (includes authentication tag)
/// * `nonce` - 24-byte nonce (unique per encryption)
/// * `aad` - Additional authenticated data (can be empty)
/// * `key` - 32-byte encryption key
///
/// # Errors
///
/// Returns error if:
/// - Authentication tag verification fails (tampered data)
/// - Nonce size is not 24 bytes
/// - Key size is not 32 bytes
pub fn decrypt_with_aead(
    ciphertext: &[u8],
    nonce: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(nonce, key)?;
    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(XNonce::from_slice(nonce), payload)
        .map_err(|e| CryptoError::decryption("aead_open", format!("authentication error: {}", e)))
}

/// Encrypt data using XChaCha20-Poly1305 AEAD
///
/// Returns the ciphertext with the 16-byte authentication tag appended.
///
/// **CRITICAL**: Never reuse the same nonce with the same key!
pub fn encrypt_with_aead(
    plaintext: &[u8],
    nonce: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(nonce, key)?;
    let payload = Payload {
        msg: plaintext,
        aad,
    };

    cipher
        .encrypt(XNonce::from_slice(nonce), payload)
        .map_err(|e| CryptoError::Other(format!("Encryption failed: {}", e)))
}

/// Fresh random 24-byte nonce from the OS RNG
pub fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn build_cipher(nonce: &[u8], key: &[u8]) -> Result<XChaCha20Poly1305, CryptoError> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonce {
            expected_size: NONCE_SIZE,
            actual_size: nonce.len(),
        });
    }
    if key.len() != KEY_SIZE {
        return Err(CryptoError::key(
            "encrypt_sk",
            format!("expected {} bytes, got {}", KEY_SIZE, key.len()),
        ));
    }

    XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::key("encrypt_sk", format!("failed to create cipher: {}", e)))
}
