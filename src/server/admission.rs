// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Connection admission
//!
//! Bounds live connections at `max_connections`. The top
//! `max(1, max_connections / 10)` slots form a reserve that only addresses
//! which recently completed a handshake may occupy, so a flood of
//! unauthenticated connections cannot lock legitimate clients out.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::protocol::ProtocolError;

#[derive(Debug)]
struct AdmissionInner {
    max_connections: usize,
    trusted_reserve: usize,
    live: AtomicUsize,
    trusted: RwLock<VecDeque<IpAddr>>,
}

/// Shared admission state, cloned into the accept loop and every handler
#[derive(Debug, Clone)]
pub struct AdmissionController {
    inner: Arc<AdmissionInner>,
}

/// Live connection slot, released on drop
#[derive(Debug)]
pub struct AdmissionPermit {
    inner: Arc<AdmissionInner>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.inner.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl AdmissionController {
    pub fn new(max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        let trusted_reserve = (max_connections / 10).max(1);
        Self {
            inner: Arc::new(AdmissionInner {
                max_connections,
                trusted_reserve,
                live: AtomicUsize::new(0),
                trusted: RwLock::new(VecDeque::with_capacity(trusted_reserve)),
            }),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.inner.max_connections
    }

    /// Size of the reserve zone, which is also the trust list capacity
    pub fn trusted_reserve(&self) -> usize {
        self.inner.trusted_reserve
    }

    pub fn live_connections(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Claim a slot for a connection from `addr`
    pub fn try_admit(&self, addr: IpAddr) -> Result<AdmissionPermit, ProtocolError> {
        let inner = &self.inner;
        let reserve_start = inner.max_connections - inner.trusted_reserve;
        let mut current = inner.live.load(Ordering::Acquire);
        loop {
            if current >= inner.max_connections {
                debug!(peer = %addr, live = current, "connection cap reached");
                return Err(ProtocolError::ConnectionLimit);
            }
            if current >= reserve_start && !self.is_trusted(addr) {
                debug!(peer = %addr, live = current, "reserve slots held for trusted clients");
                return Err(ProtocolError::ConnectionLimit);
            }
            match inner.live.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(AdmissionPermit {
                        inner: Arc::clone(inner),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Whether `addr` may use the reserve zone
    ///
    /// An empty list admits everyone: until some client has authenticated
    /// there is nobody to reserve capacity for.
    pub fn is_trusted(&self, addr: IpAddr) -> bool {
        let trusted = self
            .inner
            .trusted
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        trusted.is_empty() || trusted.contains(&addr)
    }

    /// Record an address that just completed a handshake
    pub fn mark_trusted(&self, addr: IpAddr) {
        let mut trusted = self
            .inner
            .trusted
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if trusted.contains(&addr) {
            return;
        }
        if trusted.len() >= self.inner.trusted_reserve {
            trusted.pop_front();
        }
        trusted.push_back(addr);
    }

    pub fn trusted_addresses(&self) -> Vec<IpAddr> {
        self.inner
            .trusted
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .copied()
            .collect()
    }
}
