// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Protocol versions and their capabilities.
//!
//! A version is negotiated once, from the first byte the client sends, and
//! the resulting [`Capabilities`] drive every later phase. Handshake and
//! operation code is written once and consults the capabilities instead of
//! branching on version numbers.

use std::fmt;

use super::error::ProtocolError;
use super::Opcode;

pub const MIN_VERSION: u8 = 5;
pub const MAX_VERSION: u8 = 7;
pub const DEFAULT_VERSION: u8 = 7;

/// Optional fields and operations available in a protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Stores and fetches carry a client timestamp, bound into h2/h3
    pub timestamps: bool,
    /// Push/pull streaming opcodes are accepted
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    number: u8,
    capabilities: Capabilities,
}

impl ProtocolVersion {
    /// Resolve a version byte received on the wire
    pub fn from_wire(number: u8) -> Result<Self, ProtocolError> {
        let capabilities = match number {
            5 => Capabilities {
                timestamps: false,
                streaming: false,
            },
            6 => Capabilities {
                timestamps: true,
                streaming: false,
            },
            7 => Capabilities {
                timestamps: true,
                streaming: true,
            },
            other => return Err(ProtocolError::UnsupportedVersion(other)),
        };
        Ok(Self {
            number,
            capabilities,
        })
    }

    pub fn latest() -> Self {
        Self {
            number: DEFAULT_VERSION,
            capabilities: Capabilities {
                timestamps: true,
                streaming: true,
            },
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether `opcode` may be used in a session negotiated at this version
    pub fn supports(&self, opcode: Opcode) -> bool {
        !opcode.is_streaming() || self.capabilities.streaming
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::latest()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number)
    }
}
