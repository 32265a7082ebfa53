// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Live stream framing and end-to-end protection
//!
//! The publisher seals every chunk independently with XChaCha20-Poly1305 and
//! signs a running transcript once the stream ends. The server relays the
//! bytes untouched; each puller re-derives the chunk key, opens every chunk
//! and recomputes the transcript before checking the signature.
//!
//! ## Layout
//!
//! ```text
//! header     = ts:8 ‖ key_id:8 ‖ nonce_prefix:16
//! chunk      = len:4 ‖ seal(key, nonce_prefix ‖ index:8, plaintext[len])   (len + 16 bytes)
//! terminator = 0:4 ‖ signature:64
//! abort      = 0xFFFFFFFF:4                                                 (relay only)
//! ```
//!
//! ## Key schedule
//!
//! - chunk key = BLAKE3-keyed(encrypt_sk, personalization ‖ ts ‖ key_id ‖ prefix ‖ len(cid) ‖ cid)
//! - AAD       = content-id binding (zeros without a content-id)
//! - transcript = BLAKE3-derive-key over header fields and `(index, len, sealed)` per chunk

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};

use super::error::ProtocolError;
use super::wire::read_le_u64;
use super::unix_now;
use crate::crypto::{
    decrypt_with_aead, encrypt_with_aead, sign_message, verify_message, KeyedDigest,
    SIGNATURE_SIZE, TAG_SIZE,
};

/// Largest plaintext carried by a single chunk
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;
pub const NONCE_PREFIX_SIZE: usize = 16;
pub const STREAM_HEADER_SIZE: usize = 32;
/// Frame length announcing the signature
pub const END_OF_STREAM: u32 = 0;
/// Frame length the relay sends when it gives up on a stream
pub const ABORT_MARKER: u32 = u32::MAX;

const STREAM_KEY_PERSONALIZATION: &[u8] = b"fabstir-clip-stream-key";
const CID_BIND_PERSONALIZATION: &[u8] = b"fabstir-clip-cid-bind";
const TRANSCRIPT_CONTEXT: &str = "fabstir-clipboard 2025-10 stream transcript";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub timestamp: u64,
    pub key_id: u64,
    pub nonce_prefix: [u8; NONCE_PREFIX_SIZE],
}

impl StreamHeader {
    pub fn encode(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        buf[..8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[8..16].copy_from_slice(&self.key_id.to_le_bytes());
        buf[16..].copy_from_slice(&self.nonce_prefix);
        buf
    }

    pub fn decode(buf: &[u8; STREAM_HEADER_SIZE]) -> Self {
        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        nonce_prefix.copy_from_slice(&buf[16..]);
        Self {
            timestamp: read_le_u64(&buf[..8]),
            key_id: read_le_u64(&buf[8..16]),
            nonce_prefix,
        }
    }
}

/// Number of sealed bytes following a chunk length prefix
pub fn sealed_len(len: u32) -> usize {
    len as usize + TAG_SIZE
}

/// Reject chunk lengths above [`MAX_CHUNK_SIZE`]
pub fn check_chunk_len(len: u32) -> Result<(), ProtocolError> {
    if len as usize > MAX_CHUNK_SIZE {
        return Err(ProtocolError::ChunkTooLarge {
            len,
            max: MAX_CHUNK_SIZE,
        });
    }
    Ok(())
}

fn cid_slice(content_id: &[u8]) -> &[u8] {
    &content_id[..content_id.len().min(u16::MAX as usize)]
}

pub fn derive_stream_key(encrypt_sk: &[u8; 32], header: &StreamHeader, content_id: &[u8]) -> [u8; 32] {
    let cid = cid_slice(content_id);
    KeyedDigest::new(encrypt_sk, STREAM_KEY_PERSONALIZATION, None)
        .update(&header.timestamp.to_le_bytes())
        .update(&header.key_id.to_le_bytes())
        .update(&header.nonce_prefix)
        .update(&(cid.len() as u16).to_le_bytes())
        .update(cid)
        .finalize()
}

/// AAD tying every chunk to the caller-supplied content-id
pub fn content_id_binding(encrypt_sk: &[u8; 32], content_id: &[u8]) -> [u8; 32] {
    if content_id.is_empty() {
        return [0u8; 32];
    }
    let cid = cid_slice(content_id);
    KeyedDigest::new(encrypt_sk, CID_BIND_PERSONALIZATION, None)
        .update(&(cid.len() as u16).to_le_bytes())
        .update(cid)
        .finalize()
}

pub fn chunk_nonce(prefix: &[u8; NONCE_PREFIX_SIZE], index: u64) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[..NONCE_PREFIX_SIZE].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_SIZE..].copy_from_slice(&index.to_le_bytes());
    nonce
}

/// Running hash over everything the publisher sent
#[derive(Clone)]
pub struct StreamTranscript {
    hasher: blake3::Hasher,
}

impl StreamTranscript {
    pub fn new(header: &StreamHeader) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(TRANSCRIPT_CONTEXT);
        hasher.update(&header.timestamp.to_le_bytes());
        hasher.update(&header.key_id.to_le_bytes());
        hasher.update(&header.nonce_prefix);
        Self { hasher }
    }

    pub fn absorb_chunk(&mut self, index: u64, len: u32, sealed: &[u8]) {
        self.hasher.update(&index.to_le_bytes());
        self.hasher.update(&len.to_le_bytes());
        self.hasher.update(sealed);
    }

    pub fn digest(&self) -> [u8; 32] {
        *self.hasher.finalize().as_bytes()
    }
}

/// Publisher side: seals chunks and signs the transcript
pub struct StreamSealer {
    key: [u8; 32],
    aad: [u8; 32],
    header: StreamHeader,
    next_index: u64,
    transcript: StreamTranscript,
}

impl StreamSealer {
    /// New stream stamped now with a random nonce prefix
    pub fn new(encrypt_sk: &[u8; 32], key_id: u64, content_id: &[u8]) -> Self {
        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        OsRng.fill_bytes(&mut nonce_prefix);
        let header = StreamHeader {
            timestamp: unix_now(),
            key_id,
            nonce_prefix,
        };
        Self::with_header(encrypt_sk, header, content_id)
    }

    pub fn with_header(encrypt_sk: &[u8; 32], header: StreamHeader, content_id: &[u8]) -> Self {
        Self {
            key: derive_stream_key(encrypt_sk, &header, content_id),
            aad: content_id_binding(encrypt_sk, content_id),
            transcript: StreamTranscript::new(&header),
            header,
            next_index: 0,
        }
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn chunks_sealed(&self) -> u64 {
        self.next_index
    }

    /// Seal one chunk and return its complete frame `[len][sealed]`
    pub fn seal_chunk(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if plaintext.is_empty() {
            return Err(ProtocolError::MalformedPayload(
                "empty chunks are reserved for the terminator".to_string(),
            ));
        }
        if plaintext.len() > MAX_CHUNK_SIZE {
            return Err(ProtocolError::ChunkTooLarge {
                len: plaintext.len().min(u32::MAX as usize) as u32,
                max: MAX_CHUNK_SIZE,
            });
        }
        let len = plaintext.len() as u32;
        let nonce = chunk_nonce(&self.header.nonce_prefix, self.next_index);
        let sealed = encrypt_with_aead(plaintext, &nonce, &self.aad, &self.key)?;
        self.transcript.absorb_chunk(self.next_index, len, &sealed);
        self.next_index += 1;

        let mut frame = Vec::with_capacity(4 + sealed.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&sealed);
        Ok(frame)
    }

    /// Terminator frame: zero length followed by the transcript signature
    pub fn finish(self, signing_key: &SigningKey) -> Vec<u8> {
        let signature = sign_message(signing_key, &self.transcript.digest());
        let mut frame = Vec::with_capacity(4 + SIGNATURE_SIZE);
        frame.extend_from_slice(&END_OF_STREAM.to_le_bytes());
        frame.extend_from_slice(&signature);
        frame
    }
}

/// Puller side: opens chunks in order and checks the final signature
pub struct StreamOpener {
    key: [u8; 32],
    aad: [u8; 32],
    nonce_prefix: [u8; NONCE_PREFIX_SIZE],
    next_index: u64,
    transcript: StreamTranscript,
}

impl StreamOpener {
    pub fn new(encrypt_sk: &[u8; 32], header: &StreamHeader, content_id: &[u8]) -> Self {
        Self {
            key: derive_stream_key(encrypt_sk, header, content_id),
            aad: content_id_binding(encrypt_sk, content_id),
            nonce_prefix: header.nonce_prefix,
            next_index: 0,
            transcript: StreamTranscript::new(header),
        }
    }

    pub fn chunks_opened(&self) -> u64 {
        self.next_index
    }

    pub fn open_chunk(&mut self, len: u32, sealed: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        check_chunk_len(len)?;
        if sealed.len() != sealed_len(len) {
            return Err(ProtocolError::MalformedPayload(format!(
                "chunk {} carries {} sealed bytes, expected {}",
                self.next_index,
                sealed.len(),
                sealed_len(len)
            )));
        }
        let nonce = chunk_nonce(&self.nonce_prefix, self.next_index);
        let plaintext = decrypt_with_aead(sealed, &nonce, &self.aad, &self.key)?;
        self.transcript.absorb_chunk(self.next_index, len, sealed);
        self.next_index += 1;
        Ok(plaintext)
    }

    pub fn verify_end(
        self,
        verifying_key: &VerifyingKey,
        signature: &[u8; SIGNATURE_SIZE],
    ) -> Result<(), ProtocolError> {
        verify_message(
            verifying_key,
            &self.transcript.digest(),
            signature,
            "stream_transcript",
        )?;
        Ok(())
    }
}
