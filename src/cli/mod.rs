// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod clipboard;
pub mod genkeys;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;

/// Fabstir network clipboard
#[derive(Parser, Debug)]
#[command(name = "fabstir-clip")]
#[command(version)]
#[command(about = "Copy and paste across machines over an authenticated, encrypted link", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.fabstir-clipboard.toml)
    #[arg(long, short = 'c', global = true, env = "FABSTIR_CLIPBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the clipboard server
    Serve(serve::ServeArgs),

    /// Store stdin as the clipboard content
    Copy(clipboard::ConnectArgs),

    /// Write the clipboard content to stdout
    Paste(clipboard::ConnectArgs),

    /// Write the clipboard content to stdout and clear it
    Move(clipboard::ConnectArgs),

    /// Stream stdin live to every waiting puller
    Push(clipboard::StreamArgs),

    /// Wait for the next live stream and write it to stdout
    Pull(clipboard::StreamArgs),

    /// Generate keys and print sample configurations
    Genkeys(genkeys::GenkeysArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };

    match cli.command {
        Commands::Genkeys(args) => genkeys::genkeys(args, &config_path),
        Commands::Serve(args) => serve::serve(load_config(&config_path)?, args).await,
        Commands::Copy(args) => clipboard::copy(load_config(&config_path)?, args).await,
        Commands::Paste(args) => clipboard::paste(load_config(&config_path)?, args, false).await,
        Commands::Move(args) => clipboard::paste(load_config(&config_path)?, args, true).await,
        Commands::Push(args) => clipboard::push(load_config(&config_path)?, args).await,
        Commands::Pull(args) => clipboard::pull(load_config(&config_path)?, args).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| {
        format!(
            "Unable to load {} (run `fabstir-clip genkeys` to create one)",
            path.display()
        )
    })
}
