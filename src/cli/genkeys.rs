// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::config::keygen::GeneratedKeys;
use crate::config::{DEFAULT_CONNECT, DEFAULT_LISTEN};

/// Arguments for the genkeys command
#[derive(Args, Debug)]
pub struct GenkeysArgs {
    /// Derive the keys from a password instead of the system RNG
    #[arg(long, env = "FABSTIR_CLIPBOARD_PASSWORD")]
    pub password: Option<String>,

    /// Listen address written into the server sample
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Server address written into the client sample
    #[arg(long, default_value = DEFAULT_CONNECT)]
    pub connect: String,
}

pub fn genkeys(args: GenkeysArgs, config_path: &Path) -> Result<()> {
    let keys = match args.password.as_deref() {
        Some(password) if !password.is_empty() => GeneratedKeys::from_password(password),
        _ => GeneratedKeys::random(),
    };
    let rendered = keys.render(
        &config_path.display().to_string(),
        &args.listen,
        &args.connect,
    )?;
    println!("{}", rendered);
    Ok(())
}
