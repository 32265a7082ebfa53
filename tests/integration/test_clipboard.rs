// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Copy, paste and move over in-memory connections

use std::time::Duration;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use fabstir_clipboard::client::ClientError;
use fabstir_clipboard::protocol::{unix_now, ProtocolError, ProtocolVersion};
use fabstir_clipboard::server::StoredContent;
use rand::{rngs::OsRng, RngCore};

use super::harness::{client_settings, server_settings, TestServer};

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    OsRng.fill_bytes(&mut data);
    data
}

#[tokio::test]
async fn test_copy_then_paste_returns_content() {
    let server = TestServer::new(server_settings());
    for len in [0usize, 1, 1000, 300_000] {
        let content = random_bytes(len);
        server
            .connect(client_settings())
            .await
            .unwrap()
            .copy(&content)
            .await
            .unwrap();

        for _ in 0..2 {
            let pasted = server
                .connect(client_settings())
                .await
                .unwrap()
                .paste(false)
                .await
                .unwrap();
            assert_eq!(pasted, content, "content of {} bytes", len);
        }
    }
}

#[tokio::test]
async fn test_move_clears_clipboard() {
    let server = TestServer::new(server_settings());
    server
        .connect(client_settings())
        .await
        .unwrap()
        .copy(b"once")
        .await
        .unwrap();

    let moved = server
        .connect(client_settings())
        .await
        .unwrap()
        .paste(true)
        .await
        .unwrap();
    assert_eq!(moved, b"once");

    let err = server
        .connect(client_settings())
        .await
        .unwrap()
        .paste(false)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ClipboardEmpty));
}

#[tokio::test]
async fn test_stale_content_is_rejected() {
    let server = TestServer::new(server_settings());
    server
        .store
        .store(StoredContent {
            key_id: client_settings().encrypt_sk_id,
            timestamp: unix_now() - 120,
            signature: [0u8; 64],
            payload: Bytes::from(vec![0u8; 64]),
        })
        .await;

    let mut settings = client_settings();
    settings.ttl = Duration::from_secs(60);
    let err = server.connect(settings).await.unwrap().paste(false).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::StaleContent { .. })
    ));
}

#[tokio::test]
async fn test_key_id_mismatch_is_reported() {
    let server = TestServer::new(server_settings());
    server
        .connect(client_settings())
        .await
        .unwrap()
        .copy(b"secret")
        .await
        .unwrap();

    let mut other = client_settings();
    other.encrypt_sk_id = 99;
    let err = server.connect(other).await.unwrap().paste(false).await.unwrap_err();
    match err {
        ClientError::KeyIdMismatch {
            configured,
            received,
        } => {
            assert_eq!(configured, 99);
            assert_eq!(received, client_settings().encrypt_sk_id);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_foreign_signature_is_not_stored() {
    let server = TestServer::new(server_settings());
    let mut forger = client_settings();
    forger.sign_sk = Some(SigningKey::from_bytes(&[0x99; 32]));

    let result = server.connect(forger).await.unwrap().copy(b"forged").await;
    assert!(result.is_err());
    assert!(server.store.fetch().await.is_none());
}

#[tokio::test]
async fn test_oversized_store_is_refused() {
    let mut settings = server_settings();
    settings.max_len = 64;
    let server = TestServer::new(settings);

    let result = server
        .connect(client_settings())
        .await
        .unwrap()
        .copy(&[7u8; 100])
        .await;
    assert!(result.is_err());
    assert!(server.store.fetch().await.is_none());

    server
        .connect(client_settings())
        .await
        .unwrap()
        .copy(&[7u8; 16])
        .await
        .unwrap();
    assert!(server.store.fetch().await.is_some());
}

#[tokio::test]
async fn test_version_without_timestamps() {
    let server = TestServer::new(server_settings());
    let mut settings = client_settings();
    settings.version = ProtocolVersion::from_wire(5).unwrap();

    server
        .connect(settings.clone())
        .await
        .unwrap()
        .copy(b"legacy")
        .await
        .unwrap();
    let stored = server.store.fetch().await.unwrap();
    assert!(unix_now() - stored.timestamp < 5, "stamped with receive time");

    let pasted = server.connect(settings).await.unwrap().paste(false).await.unwrap();
    assert_eq!(pasted, b"legacy");

    // A newer client reads what the older one stored
    let pasted = server
        .connect(client_settings())
        .await
        .unwrap()
        .paste(false)
        .await
        .unwrap();
    assert_eq!(pasted, b"legacy");
}

#[tokio::test]
async fn test_wrong_encryption_key_fails_decryption() {
    let server = TestServer::new(server_settings());
    server
        .connect(client_settings())
        .await
        .unwrap()
        .copy(b"secret")
        .await
        .unwrap();

    let mut other = client_settings();
    other.encrypt_sk = Some([0x55; 32]);
    let err = server.connect(other).await.unwrap().paste(false).await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(_)));
}
