// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Stream hub generations, snapshots and backpressure

use std::time::Duration;

use bytes::Bytes;
use fabstir_clipboard::protocol::{ProtocolError, PushStatus};
use fabstir_clipboard::server::{HubConfig, StreamHub, WaitOutcome};

fn hub() -> StreamHub {
    StreamHub::new(HubConfig {
        max_waiting: 8,
        queue_capacity: 16,
        stall_timeout: Duration::from_secs(1),
    })
}

#[tokio::test]
async fn test_late_joiner_is_excluded_from_session() {
    let hub = hub();
    let mut early = hub.register().unwrap();
    let mut session = hub.begin_publish().unwrap();

    assert!(matches!(hub.register(), Err(ProtocolError::HubBusy)));
    assert_eq!(session.relay(Bytes::from_static(b"hello")).await, 1);
    drop(session);
    assert_eq!(early.next_frame().await.as_deref(), Some(&b"hello"[..]));
}

#[tokio::test]
async fn test_each_generation_wakes_only_its_subscribers() {
    let hub = hub();
    let first = hub.register().unwrap();
    let session = hub.begin_publish().unwrap();
    assert_eq!(
        first.wait_for_publisher(Duration::from_secs(1)).await,
        WaitOutcome::Released
    );
    drop(session);

    let second = hub.register().unwrap();
    assert_eq!(
        second.wait_for_publisher(Duration::from_millis(20)).await,
        WaitOutcome::TimedOut
    );

    let _next = hub.begin_publish().unwrap();
    assert_eq!(
        second.wait_for_publisher(Duration::from_secs(1)).await,
        WaitOutcome::Released
    );
}

#[tokio::test]
async fn test_waiting_subscriber_released_from_another_task() {
    let hub = hub();
    let mut subscription = hub.register().unwrap();

    let waiter = tokio::spawn(async move {
        let outcome = subscription.wait_for_publisher(Duration::from_secs(5)).await;
        let frame = subscription.next_frame().await;
        (outcome, frame)
    });

    while hub.waiting_count() == 0 {
        tokio::task::yield_now().await;
    }
    let mut session = hub.begin_publish().unwrap();
    session.relay(Bytes::from_static(b"frame")).await;
    drop(session);

    let (outcome, frame) = waiter.await.unwrap();
    assert_eq!(outcome, WaitOutcome::Released);
    assert_eq!(frame.as_deref(), Some(&b"frame"[..]));
}

#[tokio::test]
async fn test_stalled_subscriber_dropped_after_window() {
    let hub = StreamHub::new(HubConfig {
        max_waiting: 4,
        queue_capacity: 2,
        stall_timeout: Duration::from_millis(50),
    });
    let slow = hub.register().unwrap();
    let mut session = hub.begin_publish().unwrap();

    for _ in 0..2 {
        assert_eq!(session.relay(Bytes::from_static(b"x")).await, 1);
    }
    let started = tokio::time::Instant::now();
    assert_eq!(session.relay(Bytes::from_static(b"x")).await, 0);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(slow.cancellation().is_cancelled());
}

#[tokio::test]
async fn test_stall_window_shared_by_all_subscribers() {
    let hub = StreamHub::new(HubConfig {
        max_waiting: 8,
        queue_capacity: 1,
        stall_timeout: Duration::from_millis(100),
    });
    let stalled: Vec<_> = (0..4).map(|_| hub.register().unwrap()).collect();
    let mut session = hub.begin_publish().unwrap();
    assert_eq!(session.relay(Bytes::from_static(b"x")).await, 4);

    let started = tokio::time::Instant::now();
    assert_eq!(session.relay(Bytes::from_static(b"x")).await, 0);
    // One window for the frame, not one per subscriber
    assert!(started.elapsed() < Duration::from_millis(350));
    assert!(stalled.iter().all(|s| s.cancellation().is_cancelled()));
}

#[tokio::test]
async fn test_status_after_session_ends() {
    let hub = hub();
    assert_eq!(hub.begin_publish().unwrap_err(), PushStatus::NoneWaiting);
    let _sub = hub.register().unwrap();
    let session = hub.begin_publish().unwrap();
    assert_eq!(hub.begin_publish().unwrap_err(), PushStatus::Busy);
    drop(session);
    assert!(!hub.is_publishing());
    assert_eq!(hub.begin_publish().unwrap_err(), PushStatus::NoneWaiting);
}
