// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed-width message layouts and deadline-bounded socket I/O.
//!
//! All integers are little-endian.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use super::error::ProtocolError;
use super::version::Capabilities;
use super::NONCE_SIZE;
use crate::crypto::{Digest, DIGEST_SIZE, SIGNATURE_SIZE};

/// Upper bound used when a configured limit is effectively infinite
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Absolute deadline for one protocol phase
///
/// Mirrors a socket deadline: every I/O call made under it shares the same
/// cut-off instant.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    phase: &'static str,
}

impl Deadline {
    pub fn after(limit: Duration, phase: &'static str) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(limit)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at, phase }
    }

    /// The earlier of two deadlines, keeping the phase name of the one that wins
    pub fn earliest(self, other: Deadline) -> Deadline {
        if other.at < self.at {
            other
        } else {
            self
        }
    }

    pub fn phase(&self) -> &'static str {
        self.phase
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub async fn run<T, F>(&self, fut: F) -> Result<T, ProtocolError>
    where
        F: Future<Output = io::Result<T>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProtocolError::DeadlineExceeded { phase: self.phase }),
        }
    }
}

pub async fn read_exact<R>(reader: &mut R, buf: &mut [u8], deadline: Deadline) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    deadline.run(reader.read_exact(buf)).await.map(|_| ())
}

pub async fn read_u8<R>(reader: &mut R, deadline: Deadline) -> Result<u8, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    deadline.run(reader.read_u8()).await
}

pub async fn read_u32<R>(reader: &mut R, deadline: Deadline) -> Result<u32, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    deadline.run(reader.read_u32_le()).await
}

/// Write `data` and flush, both under `deadline`
pub async fn write_flush<W>(writer: &mut W, data: &[u8], deadline: Deadline) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    deadline
        .run(async {
            writer.write_all(data).await?;
            writer.flush().await
        })
        .await
}

/// `[version:1][nonce:32][digest:32]`, sent by each side during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub version: u8,
    pub nonce: [u8; NONCE_SIZE],
    pub digest: Digest,
}

impl Hello {
    pub const SIZE: usize = 1 + NONCE_SIZE + DIGEST_SIZE;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.version;
        buf[1..1 + NONCE_SIZE].copy_from_slice(&self.nonce);
        buf[1 + NONCE_SIZE..].copy_from_slice(&self.digest);
        buf
    }

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        let mut digest = [0u8; DIGEST_SIZE];
        nonce.copy_from_slice(&buf[1..1 + NONCE_SIZE]);
        digest.copy_from_slice(&buf[1 + NONCE_SIZE..]);
        Self {
            version: buf[0],
            nonce,
            digest,
        }
    }

    pub async fn read_from<R>(reader: &mut R, deadline: Deadline) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; Self::SIZE];
        read_exact(reader, &mut buf, deadline).await?;
        Ok(Self::decode(&buf))
    }
}

/// `[digest:32][payloadLen:8][timestamp:8][signature:64]`
///
/// Prefix of both a store request (digest = h2) and a fetch response
/// (digest = h3). The timestamp is absent on the wire for versions without
/// timestamps; an empty slot is sent with a zero timestamp and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaHeader {
    pub digest: Digest,
    pub payload_len: u64,
    pub timestamp: u64,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl MetaHeader {
    pub fn encoded_len(caps: Capabilities) -> usize {
        let ts = if caps.timestamps { 8 } else { 0 };
        DIGEST_SIZE + 8 + ts + SIGNATURE_SIZE
    }

    pub fn encode(&self, caps: Capabilities) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::encoded_len(caps));
        buf.extend_from_slice(&self.digest);
        buf.extend_from_slice(&self.payload_len.to_le_bytes());
        if caps.timestamps {
            buf.extend_from_slice(&self.timestamp.to_le_bytes());
        }
        buf.extend_from_slice(&self.signature);
        buf
    }

    pub fn decode(buf: &[u8], caps: Capabilities) -> Result<Self, ProtocolError> {
        if buf.len() != Self::encoded_len(caps) {
            return Err(ProtocolError::MalformedPayload(format!(
                "metadata header is {} bytes, expected {}",
                buf.len(),
                Self::encoded_len(caps)
            )));
        }
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&buf[..DIGEST_SIZE]);
        let mut pos = DIGEST_SIZE;
        let payload_len = read_le_u64(&buf[pos..pos + 8]);
        pos += 8;
        let timestamp = if caps.timestamps {
            let ts = read_le_u64(&buf[pos..pos + 8]);
            pos += 8;
            ts
        } else {
            0
        };
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&buf[pos..pos + SIGNATURE_SIZE]);
        Ok(Self {
            digest,
            payload_len,
            timestamp,
            signature,
        })
    }

    pub async fn read_from<R>(
        reader: &mut R,
        caps: Capabilities,
        deadline: Deadline,
    ) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; Self::encoded_len(caps)];
        read_exact(reader, &mut buf, deadline).await?;
        Self::decode(&buf, caps)
    }
}

pub(crate) fn read_le_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(raw)
}
