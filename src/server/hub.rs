// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Stream Hub: one publisher, many waiting subscribers
//!
//! Pullers register and park on the current generation gate. When a
//! publisher arrives the hub snapshots the waiting set, swaps in a fresh gate
//! and cancels the old one, waking exactly the subscribers registered before
//! that moment. Frames are then relayed verbatim through one bounded queue per
//! subscriber; the hub never sees plaintext.
//!
//! ## States
//!
//! - hub: `Idle` ⇄ `Publishing` (the `publishing` flag)
//! - subscriber: `Waiting` → `Forwarding` → `Done`
//!
//! ## Backpressure
//!
//! A full queue holds the publisher back for at most `stall_timeout` per
//! frame. A subscriber still full once that expires is cancelled and dropped
//! from the session as if it had disconnected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::stream::ABORT_MARKER;
use crate::protocol::{ProtocolError, PushStatus};

/// Frames buffered per subscriber before it is considered too slow
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_MAX_WAITING: usize = 16;
/// Longest a relayed frame waits for room in a subscriber queue
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub max_waiting: usize,
    pub queue_capacity: usize,
    pub stall_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_waiting: DEFAULT_MAX_WAITING,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }
}

#[derive(Debug)]
struct WaitingSubscriber {
    sender: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct HubState {
    publishing: bool,
    waiting: HashMap<u64, WaitingSubscriber>,
    next_id: u64,
    gate: CancellationToken,
}

#[derive(Debug)]
struct HubInner {
    config: HubConfig,
    state: Mutex<HubState>,
}

#[derive(Debug, Clone)]
pub struct StreamHub {
    inner: Arc<HubInner>,
}

/// How a subscriber's wait for a publisher ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Released,
    Cancelled,
    TimedOut,
}

impl StreamHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                state: Mutex::new(HubState {
                    publishing: false,
                    waiting: HashMap::new(),
                    next_id: 0,
                    gate: CancellationToken::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_publishing(&self) -> bool {
        self.lock().publishing
    }

    pub fn waiting_count(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Register a puller for the next publish session
    ///
    /// Refused while a stream is in flight or when the waiting set is full.
    pub fn register(&self) -> Result<Subscription, ProtocolError> {
        let mut state = self.lock();
        if state.publishing {
            return Err(ProtocolError::HubBusy);
        }
        if state.waiting.len() >= self.inner.config.max_waiting {
            return Err(ProtocolError::TooManyPullers);
        }

        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        let (sender, receiver) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let cancel = CancellationToken::new();
        state.waiting.insert(
            id,
            WaitingSubscriber {
                sender,
                cancel: cancel.clone(),
            },
        );
        debug!(subscriber = id, waiting = state.waiting.len(), "puller registered");

        Ok(Subscription {
            id,
            hub: self.clone(),
            receiver,
            gate: state.gate.clone(),
            cancel,
        })
    }

    /// Start a publish session, or report why none can start
    pub fn begin_publish(&self) -> Result<PublishSession, PushStatus> {
        let mut state = self.lock();
        if state.publishing {
            return Err(PushStatus::Busy);
        }
        if state.waiting.is_empty() {
            return Err(PushStatus::NoneWaiting);
        }

        let subscribers: Vec<(u64, WaitingSubscriber)> = state.waiting.drain().collect();
        state.publishing = true;
        let gate = std::mem::replace(&mut state.gate, CancellationToken::new());
        gate.cancel();
        info!(subscribers = subscribers.len(), "📡 publish session started");

        Ok(PublishSession {
            hub: self.clone(),
            stall_timeout: self.inner.config.stall_timeout,
            subscribers,
        })
    }
}

/// A registered puller
///
/// Dropping it cancels the subscriber, which removes it from a waiting set
/// or from an in-flight relay.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    hub: StreamHub,
    receiver: mpsc::Receiver<Bytes>,
    gate: CancellationToken,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Token fired when this subscriber is dropped from the hub
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait_for_publisher(&self, wait: Duration) -> WaitOutcome {
        tokio::select! {
            biased;
            _ = self.gate.cancelled() => WaitOutcome::Released,
            _ = self.cancel.cancelled() => WaitOutcome::Cancelled,
            _ = tokio::time::sleep(wait) => WaitOutcome::TimedOut,
        }
    }

    /// Next relayed frame; `None` once the publish session has ended
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.hub.lock().waiting.remove(&self.id);
    }
}

/// The active publisher's view of its snapshot
///
/// Dropping the session closes every remaining queue and returns the hub to
/// idle.
#[derive(Debug)]
pub struct PublishSession {
    hub: StreamHub,
    stall_timeout: Duration,
    subscribers: Vec<(u64, WaitingSubscriber)>,
}

impl PublishSession {
    pub fn live_subscribers(&self) -> usize {
        self.subscribers.len()
    }

    /// Queue `frame` for every live subscriber and return how many remain
    ///
    /// Subscribers with a full queue share one `stall_timeout` window to make
    /// room; those still full when it closes are dropped.
    pub async fn relay(&mut self, frame: Bytes) -> usize {
        let mut pending = Vec::new();
        for (id, subscriber) in self.subscribers.drain(..) {
            if subscriber.cancel.is_cancelled() {
                debug!(subscriber = id, "subscriber went away");
                continue;
            }
            match subscriber.sender.try_send(frame.clone()) {
                Ok(()) => pending.push((id, subscriber, true)),
                Err(TrySendError::Full(_)) => pending.push((id, subscriber, false)),
                Err(TrySendError::Closed(_)) => {}
            }
        }

        let window = Instant::now() + self.stall_timeout;
        for (id, subscriber, delivered) in pending {
            if delivered || wait_for_room(&subscriber, frame.clone(), window).await {
                self.subscribers.push((id, subscriber));
            } else {
                debug!(subscriber = id, "subscriber queue stalled, dropping");
                subscriber.cancel.cancel();
            }
        }
        self.subscribers.len()
    }

    /// Tell the remaining subscribers the stream stopped early, then end the session
    ///
    /// Best effort: a subscriber with a full queue learns of the abort from
    /// its connection handler once the queue closes.
    pub fn abort(self) {
        let marker = Bytes::copy_from_slice(&ABORT_MARKER.to_le_bytes());
        for (_, subscriber) in &self.subscribers {
            let _ = subscriber.sender.try_send(marker.clone());
        }
    }
}

async fn wait_for_room(subscriber: &WaitingSubscriber, frame: Bytes, window: Instant) -> bool {
    tokio::select! {
        biased;
        _ = subscriber.cancel.cancelled() => false,
        sent = tokio::time::timeout_at(window, subscriber.sender.send(frame)) => {
            matches!(sent, Ok(Ok(())))
        }
    }
}

impl Drop for PublishSession {
    fn drop(&mut self) {
        self.subscribers.clear();
        self.hub.lock().publishing = false;
    }
}
