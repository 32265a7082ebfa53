// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Clipboard server
//!
//! The accept loop only does admission; every accepted socket gets its own
//! task running a [`ConnectionHandler`]. The content store, stream hub and
//! admission controller are created once and shared by all tasks.

pub mod admission;
pub mod connection;
pub mod hub;
pub mod status;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use admission::{AdmissionController, AdmissionPermit};
pub use connection::ConnectionHandler;
pub use hub::{HubConfig, PublishSession, StreamHub, Subscription, WaitOutcome};
pub use store::{ClipboardStatus, ContentStore, StoredContent};

use crate::config::{Config, ConfigError};

/// Everything a server needs from the configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: String,
    pub psk: [u8; 32],
    pub sign_pk: VerifyingKey,
    pub timeout: Duration,
    pub data_timeout: Duration,
    pub ttl: Duration,
    pub max_clients: usize,
    pub max_len: u64,
    pub max_stream_bytes: u64,
    pub max_stream_duration: Duration,
    pub max_pullers: usize,
}

impl ServerSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            listen: config.listen.clone(),
            psk: config.keys.psk,
            sign_pk: config.require_sign_pk()?,
            timeout: config.timeout,
            data_timeout: config.data_timeout,
            ttl: config.ttl,
            max_clients: config.max_clients,
            max_len: config.max_len,
            max_stream_bytes: config.max_stream_bytes,
            max_stream_duration: config.max_stream_duration,
            max_pullers: config.max_pullers,
        })
    }
}

pub struct Server {
    settings: Arc<ServerSettings>,
    store: ContentStore,
    hub: StreamHub,
    admission: AdmissionController,
}

impl Server {
    pub fn new(settings: ServerSettings) -> Self {
        let hub = StreamHub::new(HubConfig {
            max_waiting: settings.max_pullers,
            stall_timeout: settings.data_timeout,
            ..HubConfig::default()
        });
        let admission = AdmissionController::new(settings.max_clients);
        Self {
            settings: Arc::new(settings),
            store: ContentStore::new(),
            hub,
            admission,
        }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    fn handler(&self) -> ConnectionHandler {
        ConnectionHandler::new(
            Arc::clone(&self.settings),
            self.store.clone(),
            self.hub.clone(),
            self.admission.clone(),
        )
    }

    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(&self.settings.listen).await
    }

    /// Accept connections until `shutdown` fires
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        let local: SocketAddr = listener.local_addr()?;
        info!(
            address = %local,
            max_clients = self.admission.max_connections(),
            "🚀 clipboard server listening"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down clipboard server");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let permit = match self.admission.try_admit(peer.ip()) {
                        Ok(permit) => permit,
                        Err(_) => {
                            debug!(peer = %peer, "connection rejected by admission");
                            continue;
                        }
                    };
                    let _ = stream.set_nodelay(true);
                    let handler = self.handler();
                    tokio::spawn(async move {
                        let _permit = permit;
                        handler.handle(stream, peer.ip()).await;
                    });
                }
            }
        }
    }
}
