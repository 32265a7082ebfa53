// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Fabstir clipboard

use crate::protocol::version::{DEFAULT_VERSION, MAX_VERSION, MIN_VERSION};

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-10-20";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "psk-handshake",
    "xchacha20-poly1305",
    "ed25519-signatures",
    "copy-paste-move",
    "live-streaming",
    "trusted-reserve",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!(
        "Fabstir Clipboard {} ({}, protocol v{}, accepts v{}-v{}; {})",
        VERSION_NUMBER,
        BUILD_DATE,
        DEFAULT_VERSION,
        MIN_VERSION,
        MAX_VERSION,
        FEATURES.join(", ")
    )
}
