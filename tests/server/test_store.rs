// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Content store linearizability

use bytes::Bytes;
use fabstir_clipboard::server::{ClipboardStatus, ContentStore, StoredContent};

fn item(key_id: u64) -> StoredContent {
    StoredContent {
        key_id,
        timestamp: 1_700_000_000,
        signature: [key_id as u8; 64],
        payload: Bytes::from(vec![key_id as u8; 48]),
    }
}

#[tokio::test]
async fn test_fetch_is_repeatable() {
    let store = ContentStore::new();
    store.store(item(3)).await;
    assert_eq!(store.fetch().await, Some(item(3)));
    assert_eq!(store.fetch().await, Some(item(3)));
}

#[tokio::test]
async fn test_concurrent_takes_return_item_once() {
    let store = ContentStore::new();
    store.store(item(1)).await;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.take().await })
        })
        .collect();

    let mut taken = 0;
    for task in tasks {
        if task.await.unwrap().is_some() {
            taken += 1;
        }
    }
    assert_eq!(taken, 1);
    assert_eq!(store.status().await, ClipboardStatus::Empty);
}

#[tokio::test]
async fn test_concurrent_stores_leave_one_whole_item() {
    let store = ContentStore::new();
    let tasks: Vec<_> = (1..=32u64)
        .map(|id| {
            let store = store.clone();
            tokio::spawn(async move { store.store(item(id)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let content = store.fetch().await.unwrap();
    // Fields always come from the same store call
    assert_eq!(content, item(content.key_id));
}
