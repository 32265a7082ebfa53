// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client side of the protocol
//!
//! A [`Session`] owns one connection: it performs the handshake on creation
//! and is consumed by exactly one operation.

use std::time::Duration;

use ed25519_dalek::{SigningKey, VerifyingKey};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tracing::debug;

use super::error::ClientError;
use crate::config::Config;
use crate::crypto::{
    decrypt_with_aead, encrypt_with_aead, random_nonce, sign_message, verify_message, DIGEST_SIZE,
    NONCE_SIZE as AEAD_NONCE_SIZE, SIGNATURE_SIZE,
};
use crate::protocol::handshake::{auth3_store, verify_digest, PendingTranscript};
use crate::protocol::stream::{
    check_chunk_len, sealed_len, ABORT_MARKER, END_OF_STREAM, MAX_CHUNK_SIZE, STREAM_HEADER_SIZE,
};
use crate::protocol::wire::{read_exact, read_le_u64, read_u32, read_u8, write_flush};
use crate::protocol::{
    unix_now, Deadline, Hello, MetaHeader, Opcode, ProtocolError, ProtocolVersion, PushStatus,
    StreamHeader, StreamOpener, StreamSealer, Transcript, KEY_ID_SIZE, MIN_PAYLOAD_SIZE,
};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect: String,
    pub psk: [u8; 32],
    pub version: ProtocolVersion,
    pub timeout: Duration,
    pub data_timeout: Duration,
    pub ttl: Duration,
    pub sign_pk: Option<VerifyingKey>,
    pub sign_sk: Option<SigningKey>,
    pub encrypt_sk: Option<[u8; 32]>,
    pub encrypt_sk_id: u64,
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect: config.connect.clone(),
            psk: config.keys.psk,
            version: ProtocolVersion::latest(),
            timeout: config.timeout,
            data_timeout: config.data_timeout,
            ttl: config.ttl,
            sign_pk: config.keys.sign_pk,
            sign_sk: config.keys.sign_sk.clone(),
            encrypt_sk: config.keys.encrypt_sk,
            encrypt_sk_id: config.keys.encrypt_sk_id,
        }
    }

    fn encrypt_sk(&self) -> Result<[u8; 32], ClientError> {
        self.encrypt_sk.ok_or(ClientError::MissingKey("EncryptSk"))
    }

    fn sign_sk(&self) -> Result<&SigningKey, ClientError> {
        self.sign_sk.as_ref().ok_or(ClientError::MissingKey("SignSk"))
    }

    fn sign_pk(&self) -> Result<VerifyingKey, ClientError> {
        self.sign_pk.ok_or(ClientError::MissingKey("SignPk"))
    }
}

/// Totals reported after a push or pull
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: u64,
    pub bytes: u64,
}

pub struct Session<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,
    transcript: Transcript,
    settings: ClientSettings,
}

impl Session<TcpStream> {
    /// Connect to the configured server and run the handshake
    pub async fn connect(settings: &ClientSettings) -> Result<Self, ClientError> {
        let deadline = Deadline::after(settings.timeout, "connect");
        let stream = deadline
            .run(TcpStream::connect(&settings.connect))
            .await
            .map_err(|source| ClientError::Connect {
                addr: settings.connect.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Self::handshake(stream, settings.clone()).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn handshake(stream: S, settings: ClientSettings) -> Result<Self, ClientError> {
        let (reader, writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);
        let deadline = Deadline::after(settings.timeout, "handshake");

        let (pending, hello) = PendingTranscript::start(&settings.psk, settings.version);
        write_flush(&mut writer, &hello.encode(), deadline).await?;
        let reply = Hello::read_from(&mut reader, deadline)
            .await
            .map_err(|e| disconnect_as(e, "handshake refused"))?;
        let transcript = pending.finish(&settings.psk, &reply).map_err(|e| match e {
            ProtocolError::UnsupportedVersion(server) => ClientError::IncompatibleVersion {
                client: settings.version.number(),
                server,
            },
            other => other.into(),
        })?;
        debug!(version = %transcript.version(), "handshake complete");

        Ok(Self {
            reader,
            writer,
            transcript,
            settings,
        })
    }

    /// Encrypt, sign and store `plaintext` as the clipboard content
    pub async fn copy(mut self, plaintext: &[u8]) -> Result<(), ClientError> {
        let encrypt_sk = self.settings.encrypt_sk()?;
        let sign_sk = self.settings.sign_sk()?.clone();
        let psk = self.settings.psk;
        let key_id = self.settings.encrypt_sk_id.to_le_bytes();

        let nonce = random_nonce();
        let sealed = encrypt_with_aead(plaintext, &nonce, &key_id, &encrypt_sk)?;
        let mut payload = Vec::with_capacity(KEY_ID_SIZE + AEAD_NONCE_SIZE + sealed.len());
        payload.extend_from_slice(&key_id);
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&sealed);
        let signature = sign_message(&sign_sk, &payload);

        let timestamp = unix_now();
        let h2 = self.transcript.h2_store(&psk, timestamp, &signature);
        let meta = MetaHeader {
            digest: h2,
            payload_len: payload.len() as u64,
            timestamp,
            signature,
        };

        let header = meta.encode(self.transcript.capabilities());
        self.write_opcode(Opcode::Store).await?;
        let data = data_deadline(&self.settings);
        let writer = &mut self.writer;
        data.run(async {
            writer.write_all(&header).await?;
            writer.write_all(&payload).await?;
            writer.flush().await
        })
        .await?;

        let mut h3 = [0u8; DIGEST_SIZE];
        read_exact(&mut self.reader, &mut h3, data)
            .await
            .map_err(|e| disconnect_as(e, "store refused"))?;
        verify_digest(&auth3_store(&psk, &h2), &h3, "h3")?;
        Ok(())
    }

    /// Retrieve and decrypt the clipboard content; `take` clears it on the server
    pub async fn paste(mut self, take: bool) -> Result<Vec<u8>, ClientError> {
        let encrypt_sk = self.settings.encrypt_sk()?;
        let sign_pk = self.settings.sign_pk()?;
        let psk = self.settings.psk;
        let caps = self.transcript.capabilities();
        let opcode = if take { Opcode::Move } else { Opcode::Fetch };

        self.write_opcode(opcode).await?;
        let h2 = self.transcript.h2_get(&psk, opcode);
        write_flush(&mut self.writer, &h2, handshake_deadline(&self.settings)).await?;

        let data = data_deadline(&self.settings);
        let meta = MetaHeader::read_from(&mut self.reader, caps, data)
            .await
            .map_err(|e| {
                if e.is_disconnect() {
                    ClientError::ClipboardEmpty
                } else {
                    e.into()
                }
            })?;
        let h3 = self
            .transcript
            .h3_get(&psk, &h2, meta.timestamp, &meta.signature);
        verify_digest(&h3, &meta.digest, "h3")?;

        if meta.payload_len == 0 {
            return Err(ClientError::ClipboardEmpty);
        }
        if caps.timestamps {
            let age = Duration::from_secs(unix_now().saturating_sub(meta.timestamp));
            if age >= self.settings.ttl {
                return Err(ProtocolError::StaleContent {
                    age,
                    ttl: self.settings.ttl,
                }
                .into());
            }
        }
        let payload_len = usize::try_from(meta.payload_len)
            .ok()
            .filter(|len| *len >= MIN_PAYLOAD_SIZE)
            .ok_or_else(|| {
                ProtocolError::MalformedPayload(format!(
                    "server sent a payload of {} bytes",
                    meta.payload_len
                ))
            })?;

        let mut payload = vec![0u8; payload_len];
        read_exact(&mut self.reader, &mut payload, data).await?;

        let key_id = read_le_u64(&payload);
        if key_id != self.settings.encrypt_sk_id {
            return Err(ClientError::KeyIdMismatch {
                configured: self.settings.encrypt_sk_id,
                received: key_id,
            });
        }
        verify_message(&sign_pk, &payload, &meta.signature, "paste")?;

        let (header, sealed) = payload.split_at(KEY_ID_SIZE + AEAD_NONCE_SIZE);
        let plaintext = decrypt_with_aead(sealed, &header[KEY_ID_SIZE..], &header[..KEY_ID_SIZE], &encrypt_sk)?;
        Ok(plaintext)
    }

    /// Publish everything read from `input` as a live stream
    pub async fn push<I>(mut self, mut input: I, content_id: &[u8]) -> Result<StreamSummary, ClientError>
    where
        I: AsyncRead + Unpin,
    {
        let encrypt_sk = self.settings.encrypt_sk()?;
        let sign_sk = self.settings.sign_sk()?.clone();
        let psk = self.settings.psk;

        self.write_opcode(Opcode::Push).await?;
        let h2 = self.transcript.h2_get(&psk, Opcode::Push);
        let deadline = handshake_deadline(&self.settings);
        write_flush(&mut self.writer, &h2, deadline).await?;

        let status = read_u8(&mut self.reader, deadline)
            .await
            .map_err(|e| disconnect_as(e, "push refused"))?;
        match PushStatus::from_byte(status) {
            Some(PushStatus::Accepted) => {}
            Some(PushStatus::NoneWaiting) => return Err(ClientError::NoPullers),
            Some(PushStatus::Busy) => return Err(ClientError::HubBusy),
            None => {
                return Err(ProtocolError::MalformedPayload(format!(
                    "unknown push status 0x{:02x}",
                    status
                ))
                .into())
            }
        }

        let mut sealer = StreamSealer::new(&encrypt_sk, self.settings.encrypt_sk_id, content_id);
        write_flush(&mut self.writer, &sealer.header().encode(), data_deadline(&self.settings)).await?;

        let mut summary = StreamSummary::default();
        let mut chunk = vec![0u8; MAX_CHUNK_SIZE];
        loop {
            let n = input.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            let frame = sealer.seal_chunk(&chunk[..n])?;
            write_flush(&mut self.writer, &frame, data_deadline(&self.settings)).await?;
            summary.bytes += n as u64;
        }
        summary.chunks = sealer.chunks_sealed();

        let terminator = sealer.finish(&sign_sk);
        write_flush(&mut self.writer, &terminator, data_deadline(&self.settings)).await?;
        debug!(chunks = summary.chunks, bytes = summary.bytes, "stream published");
        Ok(summary)
    }

    /// Wait for the next stream and write its decrypted chunks to `output`
    ///
    /// Chunks are written as they arrive; the result is only `Ok` once the
    /// publisher's signature over the whole stream has been verified.
    pub async fn pull<O>(mut self, mut output: O, content_id: &[u8]) -> Result<StreamSummary, ClientError>
    where
        O: AsyncWrite + Unpin,
    {
        let encrypt_sk = self.settings.encrypt_sk()?;
        let sign_pk = self.settings.sign_pk()?;
        let psk = self.settings.psk;

        self.write_opcode(Opcode::Pull).await?;
        let h2 = self.transcript.h2_get(&psk, Opcode::Pull);
        write_flush(&mut self.writer, &h2, handshake_deadline(&self.settings)).await?;

        let wait = self.settings.ttl.max(self.settings.data_timeout) + self.settings.timeout;
        let mut raw_header = [0u8; STREAM_HEADER_SIZE];
        read_exact(&mut self.reader, &mut raw_header, Deadline::after(wait, "pull wait"))
            .await
            .map_err(|e| disconnect_as(e, "no stream was delivered"))?;
        let header = StreamHeader::decode(&raw_header);
        if header.key_id != self.settings.encrypt_sk_id {
            return Err(ClientError::KeyIdMismatch {
                configured: self.settings.encrypt_sk_id,
                received: header.key_id,
            });
        }

        let mut opener = StreamOpener::new(&encrypt_sk, &header, content_id);
        let mut summary = StreamSummary::default();
        let mut sealed = Vec::with_capacity(sealed_len(MAX_CHUNK_SIZE as u32));
        loop {
            let deadline = data_deadline(&self.settings);
            let len = read_u32(&mut self.reader, deadline).await?;
            match len {
                END_OF_STREAM => {
                    let mut signature = [0u8; SIGNATURE_SIZE];
                    read_exact(&mut self.reader, &mut signature, deadline).await?;
                    opener.verify_end(&sign_pk, &signature)?;
                    break;
                }
                ABORT_MARKER => return Err(ClientError::StreamAborted),
                _ => {}
            }

            check_chunk_len(len)?;
            sealed.resize(sealed_len(len), 0);
            read_exact(&mut self.reader, &mut sealed, deadline).await?;
            let plaintext = opener.open_chunk(len, &sealed)?;
            output.write_all(&plaintext).await?;
            output.flush().await?;
            summary.chunks += 1;
            summary.bytes += plaintext.len() as u64;
        }

        output.flush().await?;
        debug!(chunks = summary.chunks, bytes = summary.bytes, "stream received");
        Ok(summary)
    }

    async fn write_opcode(&mut self, opcode: Opcode) -> Result<(), ClientError> {
        if !self.transcript.version().supports(opcode) {
            return Err(ProtocolError::UnknownOpcode(opcode.as_byte()).into());
        }
        // Buffered with the request that follows it
        handshake_deadline(&self.settings)
            .run(self.writer.write_all(&[opcode.as_byte()]))
            .await?;
        Ok(())
    }
}

fn handshake_deadline(settings: &ClientSettings) -> Deadline {
    Deadline::after(settings.timeout, "handshake")
}

fn data_deadline(settings: &ClientSettings) -> Deadline {
    Deadline::after(settings.data_timeout, "data")
}

fn disconnect_as(e: ProtocolError, reason: &'static str) -> ClientError {
    if e.is_disconnect() {
        ClientError::Rejected(reason)
    } else {
        e.into()
    }
}
