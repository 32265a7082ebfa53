// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod protocol;
pub mod server;
pub mod version;

pub use client::{ClientError, ClientSettings, Session, StreamSummary};
pub use config::{Config, ConfigError, KeyMaterial};
pub use protocol::{ErrorKind, Opcode, ProtocolError, ProtocolVersion};
pub use server::{
    AdmissionController, ContentStore, Server, ServerSettings, StoredContent, StreamHub,
};
