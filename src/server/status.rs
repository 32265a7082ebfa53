// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Signal handling: status on SIGUSR1, shutdown on SIGINT/SIGTERM

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::store::{ClipboardStatus, ContentStore};

/// Human-readable clipboard status line
pub fn describe(status: &ClipboardStatus) -> String {
    match status {
        ClipboardStatus::Empty => "the clipboard is empty".to_string(),
        ClipboardStatus::Filled { age, bytes, .. } if *age <= Duration::from_secs(1) => {
            format!("the clipboard is not empty ({} bytes, last filled a few moments ago)", bytes)
        }
        ClipboardStatus::Filled { age, bytes, .. } => format!(
            "the clipboard is not empty ({} bytes, last filled {} ago)",
            bytes,
            format_age(*age)
        ),
    }
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m{}s", secs / 60, secs % 60),
        _ => format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// Spawn the signal task; it cancels `shutdown` on the first termination signal
pub fn spawn_signal_handler(store: ContentStore, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = wait_for_signals(store, &shutdown).await {
            warn!("Signal handler failed: {}", e);
        }
        shutdown.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signals(store: ContentStore, shutdown: &CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut term = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = usr1.recv() => {
                let status = store.status().await;
                info!("{}", describe(&status));
            }
            _ = term.recv() => {
                info!("Received SIGTERM");
                return Ok(());
            }
            result = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C");
                return result;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_store: ContentStore, shutdown: &CancellationToken) -> std::io::Result<()> {
    tokio::select! {
        _ = shutdown.cancelled() => Ok(()),
        result = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C");
            result
        }
    }
}
