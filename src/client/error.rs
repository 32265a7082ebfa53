// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::io;

use crate::crypto::CryptoError;
use crate::protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Unable to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: ProtocolError,
    },

    #[error("Server closed the connection: {0}")]
    Rejected(&'static str),

    #[error("Incompatible server version (client version: {client} - server version: {server})")]
    IncompatibleVersion { client: u8, server: u8 },

    #[error("The clipboard might be empty")]
    ClipboardEmpty,

    #[error("Configured key ID is {configured} but content was encrypted using key ID {received}")]
    KeyIdMismatch { configured: u64, received: u64 },

    #[error("Nobody is waiting for a stream")]
    NoPullers,

    #[error("Another client is already publishing a stream")]
    HubBusy,

    #[error("The server aborted the stream before it completed")]
    StreamAborted,

    #[error("{0} is required for this operation")]
    MissingKey(&'static str),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
