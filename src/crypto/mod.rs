// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cryptographic primitives used by the clipboard protocol
//!
//! - **Digest**: keyed BLAKE3 with personalization and salt, constant-time compare
//! - **Encryption**: XChaCha20-Poly1305 AEAD for stored items and stream chunks
//! - **Signature**: Ed25519 publisher signatures
//!
//! ## Security Considerations
//!
//! - Keys live in memory only and are never written by the protocol engine
//! - Nonces are random (stored items) or prefix ‖ counter (stream chunks)
//! - Every digest and signature comparison is constant time

pub mod digest;
pub mod encryption;
pub mod error;
pub mod signature;

pub use digest::{derive_key_id, digests_match, Digest, KeyedDigest, DIGEST_SIZE};
pub use encryption::{
    decrypt_with_aead, encrypt_with_aead, random_nonce, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use error::CryptoError;
pub use signature::{
    parse_signing_key, parse_verifying_key, sign_message, verify_message, SIGNATURE_SIZE,
};
