// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::io;
use std::time::Duration;

use crate::crypto::CryptoError;

/// Failure classes of the protocol engine
///
/// None of them is retried internally; the peer only ever observes a
/// closed connection (or a push status byte where the protocol defines one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Digest or signature mismatch
    Authentication,
    /// Unsupported version, malformed lengths, oversized chunk
    ProtocolViolation,
    /// Connection cap, puller cap, stream budgets
    ResourceExhaustion,
    /// Stale content or an expired deadline
    TimeExpired,
    /// Transport failure or peer disconnect
    Transport,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Incorrect authentication code ({step})")]
    AuthenticationFailed { step: &'static str },

    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown or unsupported opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("{declared} bytes requested, but limit set to {max} bytes")]
    PayloadTooLarge { declared: u64, max: u64 },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Chunk of {len} bytes exceeds the maximum of {max} bytes")]
    ChunkTooLarge { len: u32, max: usize },

    #[error("Connection limit reached")]
    ConnectionLimit,

    #[error("Too many pullers already waiting")]
    TooManyPullers,

    #[error("A stream is already being published")]
    HubBusy,

    #[error("Stream budget exceeded: {0}")]
    StreamBudgetExceeded(&'static str),

    #[error("{phase} deadline exceeded")]
    DeadlineExceeded { phase: &'static str },

    #[error("Content is stale: stored {age:?} ago, TTL is {ttl:?}")]
    StaleContent { age: Duration, ttl: Duration },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::AuthenticationFailed { .. } => ErrorKind::Authentication,
            ProtocolError::Crypto(CryptoError::DecryptionFailed { .. })
            | ProtocolError::Crypto(CryptoError::InvalidSignature { .. }) => {
                ErrorKind::Authentication
            }
            ProtocolError::Crypto(_)
            | ProtocolError::UnsupportedVersion(_)
            | ProtocolError::UnknownOpcode(_)
            | ProtocolError::PayloadTooLarge { .. }
            | ProtocolError::MalformedPayload(_)
            | ProtocolError::ChunkTooLarge { .. } => ErrorKind::ProtocolViolation,
            ProtocolError::ConnectionLimit
            | ProtocolError::TooManyPullers
            | ProtocolError::HubBusy
            | ProtocolError::StreamBudgetExceeded(_) => ErrorKind::ResourceExhaustion,
            ProtocolError::DeadlineExceeded { .. } | ProtocolError::StaleContent { .. } => {
                ErrorKind::TimeExpired
            }
            ProtocolError::Io(_) => ErrorKind::Transport,
        }
    }

    /// True when the peer simply went away
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(e) if matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionAborted
            )
        )
    }
}
