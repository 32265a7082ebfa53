// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::server::status::spawn_signal_handler;
use crate::server::{Server, ServerSettings};
use crate::version::get_version_string;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub listen: Option<String>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// Maximum stored payload size in bytes (0 for no limit)
    #[arg(long)]
    pub max_len: Option<u64>,

    /// Content TTL in seconds
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Handshake timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Data transfer timeout in seconds
    #[arg(long)]
    pub data_timeout: Option<u64>,
}

impl ServeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(max_clients) = self.max_clients {
            config.max_clients = max_clients;
        }
        if let Some(max_len) = self.max_len {
            config.max_len = max_len;
        }
        if let Some(ttl) = self.ttl {
            config.ttl = Duration::from_secs(ttl);
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Duration::from_secs(timeout);
        }
        if let Some(data_timeout) = self.data_timeout {
            config.data_timeout = Duration::from_secs(data_timeout);
        }
    }
}

pub async fn serve(mut config: Config, args: ServeArgs) -> Result<()> {
    args.apply(&mut config);
    let settings = ServerSettings::from_config(&config)?;
    info!("{}", get_version_string());

    let server = Server::new(settings);
    let listener = server
        .bind()
        .await
        .with_context(|| format!("Unable to listen on {}", server.settings().listen))?;

    let shutdown = CancellationToken::new();
    let signals = spawn_signal_handler(server.store().clone(), shutdown.clone());
    server.serve(listener, shutdown.clone()).await?;
    shutdown.cancel();
    let _ = signals.await;
    Ok(())
}
