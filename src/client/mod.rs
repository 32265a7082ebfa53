// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Clipboard client: copy, paste, move, push and pull

pub mod error;
pub mod session;

pub use error::ClientError;
pub use session::{ClientSettings, Session, StreamSummary};
