// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::io::IsTerminal;

use anyhow::Result;
use clap::Args;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

use crate::client::{ClientSettings, Session};
use crate::config::Config;

/// Arguments shared by the clipboard commands
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server address (overrides Connect from the configuration)
    #[arg(long)]
    pub connect: Option<String>,
}

/// Arguments for push and pull
#[derive(Args, Debug)]
pub struct StreamArgs {
    #[command(flatten)]
    pub target: ConnectArgs,

    /// Content identifier bound into every chunk; publisher and pullers must agree
    #[arg(long)]
    pub content_id: Option<String>,
}

impl StreamArgs {
    fn content_id(&self) -> &[u8] {
        self.content_id.as_deref().unwrap_or_default().as_bytes()
    }
}

fn settings(config: &Config, args: &ConnectArgs) -> ClientSettings {
    let mut settings = ClientSettings::from_config(config);
    if let Some(connect) = &args.connect {
        settings.connect = connect.clone();
    }
    settings
}

pub async fn copy(config: Config, args: ConnectArgs) -> Result<()> {
    let settings = settings(&config, &args);
    let mut content = Vec::new();
    tokio::io::stdin().read_to_end(&mut content).await?;

    Session::connect(&settings).await?.copy(&content).await?;
    if std::io::stderr().is_terminal() {
        eprintln!("Sent");
    }
    Ok(())
}

pub async fn paste(config: Config, args: ConnectArgs, take: bool) -> Result<()> {
    let settings = settings(&config, &args);
    let content = Session::connect(&settings).await?.paste(take).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&content).await?;
    stdout.flush().await?;
    Ok(())
}

pub async fn push(config: Config, args: StreamArgs) -> Result<()> {
    let settings = settings(&config, &args.target);
    let summary = Session::connect(&settings)
        .await?
        .push(tokio::io::stdin(), args.content_id())
        .await?;
    info!(chunks = summary.chunks, bytes = summary.bytes, "✅ stream published");
    Ok(())
}

pub async fn pull(config: Config, args: StreamArgs) -> Result<()> {
    let settings = settings(&config, &args.target);
    let summary = Session::connect(&settings)
        .await?
        .pull(tokio::io::stdout(), args.content_id())
        .await?;
    info!(chunks = summary.chunks, bytes = summary.bytes, "✅ stream verified");
    Ok(())
}
