// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ed25519 publisher signatures and key parsing

use ed25519_dalek::SigningKey;
use fabstir_clipboard::crypto::{
    parse_signing_key, parse_verifying_key, sign_message, verify_message, CryptoError,
};
use rand::{rngs::OsRng, RngCore};

fn random_signing_key() -> SigningKey {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    SigningKey::from_bytes(&seed)
}

#[test]
fn test_signature_binds_payload() {
    let signing_key = random_signing_key();
    let verifying_key = signing_key.verifying_key();

    let payload = b"key-id nonce ciphertext";
    let signature = sign_message(&signing_key, payload);
    assert!(verify_message(&verifying_key, payload, &signature, "store").is_ok());

    let result = verify_message(&verifying_key, b"key-id nonce ciphertexT", &signature, "store");
    match result {
        Err(CryptoError::InvalidSignature { operation, .. }) => assert_eq!(operation, "store"),
        other => panic!("expected InvalidSignature, got {:?}", other),
    }
}

#[test]
fn test_foreign_key_rejected() {
    let publisher = random_signing_key();
    let impostor = random_signing_key();

    let signature = sign_message(&impostor, b"payload");
    assert!(verify_message(&publisher.verifying_key(), b"payload", &signature, "fetch").is_err());
}

#[test]
fn test_seed_round_trip() {
    let seed = [0x5au8; 32];
    let signing_key = parse_signing_key(&seed).unwrap();
    assert_eq!(signing_key.to_bytes(), seed);

    let public = signing_key.verifying_key().to_bytes();
    let verifying_key = parse_verifying_key(&public).unwrap();
    assert_eq!(verifying_key, signing_key.verifying_key());
}

#[test]
fn test_key_length_errors() {
    assert!(matches!(
        parse_signing_key(&[0u8; 64]),
        Err(CryptoError::InvalidKey { .. })
    ));
    assert!(matches!(
        parse_verifying_key(&[0u8; 31]),
        Err(CryptoError::InvalidKey { .. })
    ));
}
