// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Push/pull through the stream hub

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fabstir_clipboard::client::{ClientError, Session, StreamSummary};
use fabstir_clipboard::protocol::stream::{StreamSealer, MAX_CHUNK_SIZE};
use fabstir_clipboard::protocol::ProtocolError;
use fabstir_clipboard::server::{HubConfig, Server};
use rand::{rngs::OsRng, RngCore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::harness::{client_settings, server_settings, signing_key, TestServer, ENCRYPT_SK};

fn spawn_puller(
    server: &TestServer,
    content_id: &'static [u8],
) -> JoinHandle<(Result<StreamSummary, ClientError>, Vec<u8>)> {
    let server = server.clone();
    tokio::spawn(async move {
        let session = server.connect(client_settings()).await.unwrap();
        let mut output = Vec::new();
        let result = session.pull(&mut output, content_id).await;
        (result, output)
    })
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    OsRng.fill_bytes(&mut data);
    data
}

#[tokio::test]
async fn test_push_without_pullers() {
    let server = TestServer::new(server_settings());
    let err = server
        .connect(client_settings())
        .await
        .unwrap()
        .push(&b"nobody listens"[..], b"")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NoPullers));
    assert!(!server.hub.is_publishing());
}

#[tokio::test]
async fn test_push_reaches_every_waiting_puller() {
    let server = TestServer::new(server_settings());
    let pullers: Vec<_> = (0..3).map(|_| spawn_puller(&server, b"")).collect();
    server.wait_for_pullers(3).await;

    let content = random_bytes(2 * MAX_CHUNK_SIZE + 1234);
    let summary = server
        .connect(client_settings())
        .await
        .unwrap()
        .push(&content[..], b"")
        .await
        .unwrap();
    assert_eq!(summary.bytes, content.len() as u64);

    for puller in pullers {
        let (result, output) = puller.await.unwrap();
        let received = result.unwrap();
        assert_eq!(received.bytes, content.len() as u64);
        assert_eq!(output, content);
    }
}

#[tokio::test]
async fn test_second_publisher_is_busy() {
    let server = TestServer::new(server_settings());
    let _puller = spawn_puller(&server, b"");
    server.wait_for_pullers(1).await;
    let _session = server.hub.begin_publish().unwrap();

    let err = server
        .connect(client_settings())
        .await
        .unwrap()
        .push(&b"late"[..], b"")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::HubBusy));
}

#[tokio::test]
async fn test_puller_rejected_while_publishing() {
    let server = TestServer::new(server_settings());
    let _first = spawn_puller(&server, b"");
    server.wait_for_pullers(1).await;
    let _session = server.hub.begin_publish().unwrap();

    let (result, output) = spawn_puller(&server, b"").await.unwrap();
    assert!(matches!(result, Err(ClientError::Rejected(_))));
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_content_id_must_match() {
    let server = TestServer::new(server_settings());
    let puller = spawn_puller(&server, b"channel-b");
    server.wait_for_pullers(1).await;

    server
        .connect(client_settings())
        .await
        .unwrap()
        .push(&b"for channel a"[..], b"channel-a")
        .await
        .unwrap();

    let (result, output) = puller.await.unwrap();
    assert!(matches!(
        result,
        Err(ClientError::Protocol(ProtocolError::Crypto(_)))
    ));
    assert!(output.is_empty());
}

/// Publishes through the hub directly so the relayed bytes can be altered
async fn relay_manually(server: &TestServer, flip_terminator: bool) -> Result<StreamSummary, ClientError> {
    let puller = spawn_puller(server, b"");
    server.wait_for_pullers(1).await;

    let mut session = server.hub.begin_publish().unwrap();
    let mut sealer = StreamSealer::new(&ENCRYPT_SK, client_settings().encrypt_sk_id, b"");
    session.relay(Bytes::copy_from_slice(&sealer.header().encode())).await;
    session.relay(Bytes::from(sealer.seal_chunk(b"first").unwrap())).await;
    session.relay(Bytes::from(sealer.seal_chunk(b"second").unwrap())).await;
    let mut terminator = sealer.finish(&signing_key());
    if flip_terminator {
        let last = terminator.len() - 1;
        terminator[last] ^= 0x01;
    }
    session.relay(Bytes::from(terminator)).await;
    drop(session);

    let (result, output) = puller.await.unwrap();
    assert_eq!(output, b"firstsecond");
    result
}

#[tokio::test]
async fn test_signature_verifies_for_untouched_stream() {
    let server = TestServer::new(server_settings());
    let summary = relay_manually(&server, false).await.unwrap();
    assert_eq!(summary.chunks, 2);
}

#[tokio::test]
async fn test_flipped_terminator_byte_fails_signature() {
    let server = TestServer::new(server_settings());
    let err = relay_manually(&server, true).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::Crypto(_))
    ));
}

#[tokio::test]
async fn test_abort_frame_reaches_puller() {
    let server = TestServer::new(server_settings());
    let puller = spawn_puller(&server, b"");
    server.wait_for_pullers(1).await;

    let mut session = server.hub.begin_publish().unwrap();
    let sealer = StreamSealer::new(&ENCRYPT_SK, client_settings().encrypt_sk_id, b"");
    session.relay(Bytes::copy_from_slice(&sealer.header().encode())).await;
    session.abort();

    let (result, _) = puller.await.unwrap();
    assert!(matches!(result, Err(ClientError::StreamAborted)));
    assert!(!server.hub.is_publishing());
}

#[tokio::test]
async fn test_byte_budget_aborts_stream() {
    let mut settings = server_settings();
    settings.max_stream_bytes = 1024;
    let server = TestServer::new(settings);
    let puller = spawn_puller(&server, b"");
    server.wait_for_pullers(1).await;

    let _ = server
        .connect(client_settings())
        .await
        .unwrap()
        .push(&random_bytes(4096)[..], b"")
        .await;

    let (result, _) = tokio::time::timeout(Duration::from_secs(5), puller)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ClientError::StreamAborted)));
}

#[tokio::test]
async fn test_duration_budget_aborts_stream() {
    let mut settings = server_settings();
    settings.max_stream_duration = Duration::from_millis(300);
    let server = TestServer::new(settings);
    let puller = spawn_puller(&server, b"");
    server.wait_for_pullers(1).await;

    // The publisher sends one chunk, then stalls past the budget
    let (mut input, source) = tokio::io::duplex(4096);
    let feeder = tokio::spawn(async move {
        input.write_all(&[7u8; 1024]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });
    let publisher = server.connect(client_settings()).await.unwrap();
    let push = tokio::spawn(async move { publisher.push(source, b"").await });

    let (result, output) = tokio::time::timeout(Duration::from_secs(5), puller)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ClientError::StreamAborted)));
    assert_eq!(output, vec![7u8; 1024]);
    assert!(!server.hub.is_publishing());

    feeder.await.unwrap();
    let _ = push.await.unwrap();
}

#[tokio::test]
async fn test_stream_closed_without_terminator_reports_abort() {
    let server = TestServer::new(server_settings());
    let puller = spawn_puller(&server, b"");
    server.wait_for_pullers(1).await;

    let mut session = server.hub.begin_publish().unwrap();
    let mut sealer = StreamSealer::new(&ENCRYPT_SK, client_settings().encrypt_sk_id, b"");
    session.relay(Bytes::copy_from_slice(&sealer.header().encode())).await;
    session.relay(Bytes::from(sealer.seal_chunk(b"partial").unwrap())).await;
    drop(session);

    let (result, output) = puller.await.unwrap();
    assert!(matches!(result, Err(ClientError::StreamAborted)));
    assert_eq!(output, b"partial");
}

#[tokio::test]
async fn test_stalled_puller_told_stream_aborted() {
    let hub = HubConfig {
        max_waiting: 4,
        queue_capacity: 2,
        stall_timeout: Duration::from_millis(50),
    };
    let server = TestServer::with_hub(server_settings(), hub);

    // The puller's output is not drained until the relay has given up on it
    let (sink, mut drain) = tokio::io::duplex(1024);
    let session = server.connect(client_settings()).await.unwrap();
    let puller = tokio::spawn(async move { session.pull(sink, b"").await });
    server.wait_for_pullers(1).await;

    let mut publish = server.hub.begin_publish().unwrap();
    let mut sealer = StreamSealer::new(&ENCRYPT_SK, client_settings().encrypt_sk_id, b"");
    publish.relay(Bytes::copy_from_slice(&sealer.header().encode())).await;
    let chunk = random_bytes(MAX_CHUNK_SIZE);
    let mut remaining = 1;
    for _ in 0..64 {
        remaining = publish.relay(Bytes::from(sealer.seal_chunk(&chunk).unwrap())).await;
        if remaining == 0 {
            break;
        }
    }
    assert_eq!(remaining, 0);
    drop(publish);

    let drained = tokio::spawn(async move {
        let mut received = Vec::new();
        drain.read_to_end(&mut received).await.unwrap();
        received.len()
    });
    let result = tokio::time::timeout(Duration::from_secs(5), puller)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ClientError::StreamAborted)));
    assert_eq!(drained.await.unwrap() % MAX_CHUNK_SIZE, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_stream_reaches_every_puller_over_tcp() {
    let server = Arc::new(Server::new(server_settings()));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let serving = {
        let server = Arc::clone(&server);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.serve(listener, shutdown).await })
    };

    let mut settings = client_settings();
    settings.connect = addr.to_string();
    let pullers: Vec<_> = (0..2)
        .map(|_| {
            let settings = settings.clone();
            tokio::spawn(async move {
                let mut output = Vec::new();
                let result = Session::connect(&settings)
                    .await?
                    .pull(&mut output, b"")
                    .await;
                result.map(|summary| (summary, output))
            })
        })
        .collect();
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.hub().waiting_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let content = random_bytes(32 * 1024 * 1024);
    let summary = Session::connect(&settings)
        .await
        .unwrap()
        .push(&content[..], b"")
        .await
        .unwrap();
    assert_eq!(summary.bytes, content.len() as u64);

    for puller in pullers {
        let (received, output) = puller.await.unwrap().unwrap();
        assert_eq!(received.bytes, content.len() as u64);
        assert!(output == content, "puller output differs from the published stream");
    }

    shutdown.cancel();
    serving.await.unwrap().unwrap();
}
