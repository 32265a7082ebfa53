// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Single-slot clipboard storage

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::crypto::SIGNATURE_SIZE;
use crate::protocol::unix_now;

/// The most recently copied item, still encrypted and signed by its author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub key_id: u64,
    pub timestamp: u64,
    pub signature: [u8; SIGNATURE_SIZE],
    pub payload: Bytes,
}

/// Read-only snapshot for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardStatus {
    Empty,
    Filled {
        key_id: u64,
        age: Duration,
        bytes: usize,
    },
}

/// Server-wide clipboard slot
///
/// Cloning shares the same slot. A store replaces the item wholesale, a
/// take reads and clears it under one write lock.
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    slot: Arc<RwLock<Option<StoredContent>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, content: StoredContent) {
        *self.slot.write().await = Some(content);
    }

    pub async fn fetch(&self) -> Option<StoredContent> {
        self.slot.read().await.clone()
    }

    pub async fn take(&self) -> Option<StoredContent> {
        self.slot.write().await.take()
    }

    pub async fn status(&self) -> ClipboardStatus {
        match self.slot.read().await.as_ref() {
            None => ClipboardStatus::Empty,
            Some(content) => ClipboardStatus::Filled {
                key_id: content.key_id,
                age: Duration::from_secs(unix_now().saturating_sub(content.timestamp)),
                bytes: content.payload.len(),
            },
        }
    }
}
