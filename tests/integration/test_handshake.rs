// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handshake behaviour seen from the wire, and a full run over loopback TCP

use std::time::Duration;

use fabstir_clipboard::client::{ClientError, Session};
use fabstir_clipboard::protocol::handshake::{auth0, auth1, auth2_get};
use fabstir_clipboard::protocol::{Hello, Opcode};
use fabstir_clipboard::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::harness::{client_settings, server_settings, TestServer, PEER, PSK};

async fn read_to_close(stream: &mut tokio::io::DuplexStream) -> Vec<u8> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("server kept the connection open")
        .unwrap();
    received
}

fn client_hello(psk: &[u8; 32], version: u8) -> Hello {
    let nonce = [3u8; 32];
    Hello {
        version,
        nonce,
        digest: auth0(psk, version, &nonce),
    }
}

#[tokio::test]
async fn test_server_answers_valid_hello() {
    let server = TestServer::new(server_settings());
    let mut stream = server.open();
    let hello = client_hello(&PSK, 7);
    stream.write_all(&hello.encode()).await.unwrap();

    let mut raw = [0u8; Hello::SIZE];
    stream.read_exact(&mut raw).await.unwrap();
    let reply = Hello::decode(&raw);
    assert_eq!(reply.version, 7);
    assert_eq!(reply.digest, auth1(&PSK, 7, &reply.nonce, &hello.digest));
}

#[tokio::test]
async fn test_wrong_secret_gets_silent_close() {
    let server = TestServer::new(server_settings());
    let mut stream = server.open();
    let mut other = PSK;
    other[31] ^= 0x80;
    stream.write_all(&client_hello(&other, 7).encode()).await.unwrap();
    assert!(read_to_close(&mut stream).await.is_empty());

    let mut settings = client_settings();
    settings.psk = other;
    assert!(matches!(
        server.connect(settings).await,
        Err(ClientError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_unsupported_version_gets_silent_close() {
    let server = TestServer::new(server_settings());
    for version in [4u8, 8, 0xff] {
        let mut stream = server.open();
        stream.write_all(&client_hello(&PSK, version).encode()).await.unwrap();
        assert!(read_to_close(&mut stream).await.is_empty());
    }
}

#[tokio::test]
async fn test_streaming_opcode_needs_capability() {
    let server = TestServer::new(server_settings());
    let mut stream = server.open();
    stream.write_all(&client_hello(&PSK, 6).encode()).await.unwrap();
    let mut raw = [0u8; Hello::SIZE];
    stream.read_exact(&mut raw).await.unwrap();
    let reply = Hello::decode(&raw);

    stream.write_all(&[Opcode::Pull.as_byte()]).await.unwrap();
    stream
        .write_all(&auth2_get(&PSK, &reply.digest, Opcode::Pull))
        .await
        .unwrap();
    assert!(read_to_close(&mut stream).await.is_empty());
    assert_eq!(server.hub.waiting_count(), 0);
}

#[tokio::test]
async fn test_client_reports_incompatible_server() {
    let (client, mut fake_server) = tokio::io::duplex(1024);
    tokio::spawn(async move {
        let mut raw = [0u8; Hello::SIZE];
        fake_server.read_exact(&mut raw).await.unwrap();
        let reply = Hello {
            version: 6,
            nonce: [0u8; 32],
            digest: [0u8; 32],
        };
        fake_server.write_all(&reply.encode()).await.unwrap();
        let _ = fake_server.read_u8().await;
    });

    match Session::handshake(client, client_settings()).await {
        Err(ClientError::IncompatibleVersion { client, server }) => {
            assert_eq!(client, 7);
            assert_eq!(server, 6);
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("handshake should fail"),
    }
}

#[tokio::test]
async fn test_handshake_deadline_closes_idle_connection() {
    let mut settings = server_settings();
    settings.timeout = Duration::from_millis(50);
    let server = TestServer::new(settings);
    let mut stream = server.open();
    stream.write_all(&[7u8, 1, 2, 3]).await.unwrap();
    assert!(read_to_close(&mut stream).await.is_empty());
}

#[tokio::test]
async fn test_only_authenticated_peers_are_trusted() {
    let server = TestServer::new(server_settings());

    let mut stream = server.open();
    let hello = client_hello(&[0x55; 32], 7);
    stream.write_all(&hello.encode()).await.unwrap();
    assert!(read_to_close(&mut stream).await.is_empty());
    assert!(server.admission.trusted_addresses().is_empty());

    let _session = server.connect(client_settings()).await.unwrap();
    // Trust is recorded right after the reply is written
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.admission.trusted_addresses().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("authenticated peer was not trusted");
    assert_eq!(server.admission.trusted_addresses(), vec![PEER]);
}

#[tokio::test]
async fn test_copy_paste_over_tcp() {
    let server = Server::new(server_settings());
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    let serving = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.serve(listener, shutdown).await })
    };

    let mut settings = client_settings();
    settings.connect = addr.to_string();
    Session::connect(&settings)
        .await
        .unwrap()
        .copy(b"over the wire")
        .await
        .unwrap();
    let pasted = Session::connect(&settings)
        .await
        .unwrap()
        .paste(false)
        .await
        .unwrap();
    assert_eq!(pasted, b"over the wire");

    shutdown.cancel();
    serving.await.unwrap().unwrap();
}
