// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Clipboard wire protocol
//!
//! Shared by the server's connection handler and the client's session
//! driver:
//!
//! - **handshake**: h0..h3 digest derivations and the per-connection transcript
//! - **wire**: fixed-width message layouts and deadline-bounded I/O
//! - **stream**: chunk sealing, opening and the signed stream transcript
//! - **version**: negotiated protocol version and its capabilities
//!
//! ## Message Flow
//!
//! 1. Client sends `[version][r][h0]`, server answers `[version][r2][h1]`
//! 2. Client sends one opcode byte (`S`, `G`, `M`, `P`, `L`)
//! 3. Client sends h2 (plus metadata and payload for stores)
//! 4. Server answers h3 (plus content for fetches), a push status, or a stream

pub mod error;
pub mod handshake;
pub mod stream;
pub mod version;
pub mod wire;

use std::fmt;

pub use error::{ErrorKind, ProtocolError};
pub use handshake::Transcript;
pub use stream::{StreamHeader, StreamOpener, StreamSealer};
pub use version::{Capabilities, ProtocolVersion};
pub use wire::{Deadline, Hello, MetaHeader};

/// Operation selected by the client after the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Copy: replace the stored item
    Store = b'S',
    /// Paste: read the stored item
    Fetch = b'G',
    /// Paste and clear the stored item
    Move = b'M',
    /// Publish a live stream
    Push = b'P',
    /// Subscribe to the next live stream
    Pull = b'L',
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'S' => Some(Opcode::Store),
            b'G' => Some(Opcode::Fetch),
            b'M' => Some(Opcode::Move),
            b'P' => Some(Opcode::Push),
            b'L' => Some(Opcode::Pull),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, Opcode::Push | Opcode::Pull)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Store => "store",
            Opcode::Fetch => "fetch",
            Opcode::Move => "move",
            Opcode::Push => "push",
            Opcode::Pull => "pull",
        };
        f.write_str(name)
    }
}

/// Status byte returned to a publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PushStatus {
    NoneWaiting = 0x00,
    Accepted = 0x01,
    Busy = 0x02,
}

impl PushStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(PushStatus::NoneWaiting),
            0x01 => Some(PushStatus::Accepted),
            0x02 => Some(PushStatus::Busy),
            _ => None,
        }
    }
}

/// Size of the per-side handshake nonces
pub const NONCE_SIZE: usize = 32;
/// Size of the key identifier prefixed to every stored payload
pub const KEY_ID_SIZE: usize = 8;
/// Smallest valid stored payload: key-id, nonce and an empty sealed body
pub const MIN_PAYLOAD_SIZE: usize =
    KEY_ID_SIZE + crate::crypto::NONCE_SIZE + crate::crypto::TAG_SIZE;

/// Current Unix time in seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
