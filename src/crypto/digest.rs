// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Keyed BLAKE3 digests with domain separation.
//!
//! Every digest is BLAKE3 in keyed mode, fed `len(personalization) ‖
//! personalization` and, when present, a one-byte salt before the message
//! fields. Two digests with different personalizations or salts never
//! collide on the same input.

use subtle::ConstantTimeEq;

pub const DIGEST_SIZE: usize = 32;

pub type Digest = [u8; DIGEST_SIZE];

/// Context string for key identifiers derived from the encryption key
const KEY_ID_CONTEXT: &str = "fabstir-clipboard 2025-10 encryption key id";

/// Incremental keyed digest
pub struct KeyedDigest {
    hasher: blake3::Hasher,
}

impl KeyedDigest {
    pub fn new(key: &[u8; 32], personalization: &[u8], salt: Option<u8>) -> Self {
        let mut hasher = blake3::Hasher::new_keyed(key);
        hasher.update(&[personalization.len() as u8]);
        hasher.update(personalization);
        if let Some(salt) = salt {
            hasher.update(&[salt]);
        }
        Self { hasher }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    pub fn finalize(&self) -> Digest {
        *self.hasher.finalize().as_bytes()
    }
}

/// Constant-time equality for digests, MACs and signatures
///
/// Slices of different lengths compare unequal.
pub fn digests_match(expected: &[u8], received: &[u8]) -> bool {
    expected.ct_eq(received).into()
}

/// Short public identifier for an encryption key
pub fn derive_key_id(encrypt_sk: &[u8; 32]) -> u64 {
    let derived = blake3::derive_key(KEY_ID_CONTEXT, encrypt_sk);
    let mut id = [0u8; 8];
    id.copy_from_slice(&derived[..8]);
    u64::from_le_bytes(id)
}
