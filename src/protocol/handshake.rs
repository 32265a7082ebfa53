// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handshake digests
//!
//! Six derivations, all BLAKE3 keyed by the pre-shared key and separated by
//! a personalization string plus a one-byte salt (0..=3):
//!
//! ```text
//! h0        = H(0, version ‖ r)
//! h1        = H(1, version ‖ r2 ‖ h0)
//! h2(get)   = H(2, h1 ‖ opcode)
//! h2(store) = H(2, h1 ‖ opcode ‖ ts ‖ signature)
//! h3(get)   = H(3, h2 ‖ ts ‖ signature)
//! h3(store) = H(3, h2)
//! ```
//!
//! `ts` is skipped entirely for versions without timestamps. h0/h1 prove
//! both sides know the key; h2/h3 bind the selected operation and its
//! metadata to that proof so nothing can be replayed across operations or
//! sessions.

use rand::{rngs::OsRng, RngCore};

use super::error::ProtocolError;
use super::version::{Capabilities, ProtocolVersion};
use super::wire::Hello;
use super::{Opcode, NONCE_SIZE};
use crate::crypto::{digests_match, Digest, KeyedDigest, SIGNATURE_SIZE};

const AUTH_PERSONALIZATION: &[u8] = b"fabstir-clip-auth";

fn auth_hasher(psk: &[u8; 32], salt: u8) -> KeyedDigest {
    KeyedDigest::new(psk, AUTH_PERSONALIZATION, Some(salt))
}

pub fn auth0(psk: &[u8; 32], version: u8, r: &[u8; NONCE_SIZE]) -> Digest {
    auth_hasher(psk, 0).update(&[version]).update(r).finalize()
}

pub fn auth1(psk: &[u8; 32], version: u8, r2: &[u8; NONCE_SIZE], h0: &Digest) -> Digest {
    auth_hasher(psk, 1)
        .update(&[version])
        .update(r2)
        .update(h0)
        .finalize()
}

pub fn auth2_get(psk: &[u8; 32], h1: &Digest, opcode: Opcode) -> Digest {
    auth_hasher(psk, 2)
        .update(h1)
        .update(&[opcode.as_byte()])
        .finalize()
}

pub fn auth2_store(
    psk: &[u8; 32],
    caps: Capabilities,
    h1: &Digest,
    timestamp: u64,
    signature: &[u8; SIGNATURE_SIZE],
) -> Digest {
    let mut hasher = auth_hasher(psk, 2);
    hasher.update(h1).update(&[Opcode::Store.as_byte()]);
    if caps.timestamps {
        hasher.update(&timestamp.to_le_bytes());
    }
    hasher.update(signature).finalize()
}

pub fn auth3_get(
    psk: &[u8; 32],
    caps: Capabilities,
    h2: &Digest,
    timestamp: u64,
    signature: &[u8; SIGNATURE_SIZE],
) -> Digest {
    let mut hasher = auth_hasher(psk, 3);
    hasher.update(h2);
    if caps.timestamps {
        hasher.update(&timestamp.to_le_bytes());
    }
    hasher.update(signature).finalize()
}

pub fn auth3_store(psk: &[u8; 32], h2: &Digest) -> Digest {
    auth_hasher(psk, 3).update(h2).finalize()
}

/// Constant-time check of a received digest against the recomputed one
pub fn verify_digest(
    expected: &Digest,
    received: &Digest,
    step: &'static str,
) -> Result<(), ProtocolError> {
    if digests_match(expected, received) {
        Ok(())
    } else {
        Err(ProtocolError::AuthenticationFailed { step })
    }
}

/// Per-connection handshake state
///
/// Holds both nonces and h0/h1. Created at connection start and dropped
/// with the connection; h2/h3 are derived from it per operation.
#[derive(Debug, Clone)]
pub struct Transcript {
    version: ProtocolVersion,
    client_nonce: [u8; NONCE_SIZE],
    server_nonce: [u8; NONCE_SIZE],
    h0: Digest,
    h1: Digest,
}

/// Client state between sending its hello and receiving the server's
#[derive(Debug, Clone)]
pub struct PendingTranscript {
    version: ProtocolVersion,
    client_nonce: [u8; NONCE_SIZE],
    h0: Digest,
}

impl PendingTranscript {
    /// Start a handshake: fresh client nonce, h0, and the hello to send
    pub fn start(psk: &[u8; 32], version: ProtocolVersion) -> (Self, Hello) {
        let mut client_nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut client_nonce);
        let h0 = auth0(psk, version.number(), &client_nonce);
        let hello = Hello {
            version: version.number(),
            nonce: client_nonce,
            digest: h0,
        };
        (
            Self {
                version,
                client_nonce,
                h0,
            },
            hello,
        )
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Check the server's hello and complete the transcript
    ///
    /// The version is compared before the digest; callers report a version
    /// mismatch separately since it is not an authentication failure.
    pub fn finish(self, psk: &[u8; 32], server: &Hello) -> Result<Transcript, ProtocolError> {
        if server.version != self.version.number() {
            return Err(ProtocolError::UnsupportedVersion(server.version));
        }
        let expected = auth1(psk, self.version.number(), &server.nonce, &self.h0);
        verify_digest(&expected, &server.digest, "h1")?;
        Ok(Transcript {
            version: self.version,
            client_nonce: self.client_nonce,
            server_nonce: server.nonce,
            h0: self.h0,
            h1: server.digest,
        })
    }
}

impl Transcript {
    /// Server side: validate the client's hello and produce the reply
    pub fn respond(psk: &[u8; 32], client: &Hello) -> Result<(Self, Hello), ProtocolError> {
        let version = ProtocolVersion::from_wire(client.version)?;
        let expected = auth0(psk, client.version, &client.nonce);
        verify_digest(&expected, &client.digest, "h0")?;

        let mut server_nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut server_nonce);
        let h1 = auth1(psk, client.version, &server_nonce, &client.digest);
        let reply = Hello {
            version: client.version,
            nonce: server_nonce,
            digest: h1,
        };
        Ok((
            Self {
                version,
                client_nonce: client.nonce,
                server_nonce,
                h0: client.digest,
                h1,
            },
            reply,
        ))
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn capabilities(&self) -> Capabilities {
        self.version.capabilities()
    }

    pub fn client_nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.client_nonce
    }

    pub fn server_nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.server_nonce
    }

    pub fn h0(&self) -> &Digest {
        &self.h0
    }

    pub fn h1(&self) -> &Digest {
        &self.h1
    }

    pub fn h2_get(&self, psk: &[u8; 32], opcode: Opcode) -> Digest {
        auth2_get(psk, &self.h1, opcode)
    }

    pub fn h2_store(
        &self,
        psk: &[u8; 32],
        timestamp: u64,
        signature: &[u8; SIGNATURE_SIZE],
    ) -> Digest {
        auth2_store(psk, self.capabilities(), &self.h1, timestamp, signature)
    }

    pub fn h3_get(
        &self,
        psk: &[u8; 32],
        h2: &Digest,
        timestamp: u64,
        signature: &[u8; SIGNATURE_SIZE],
    ) -> Digest {
        auth3_get(psk, self.capabilities(), h2, timestamp, signature)
    }
}
