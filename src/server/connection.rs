// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-connection protocol driver, server side
//!
//! Runs the handshake under the short deadline, then dispatches on the
//! opcode to the content store or the stream hub. Every failure simply ends
//! the task; the peer sees a closed socket.

use std::net::IpAddr;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

use super::admission::AdmissionController;
use super::hub::{PublishSession, StreamHub, WaitOutcome};
use super::store::{ContentStore, StoredContent};
use super::ServerSettings;
use crate::crypto::{verify_message, Digest, DIGEST_SIZE, SIGNATURE_SIZE};
use crate::protocol::handshake::{auth3_store, verify_digest};
use crate::protocol::stream::{
    check_chunk_len, sealed_len, ABORT_MARKER, END_OF_STREAM, STREAM_HEADER_SIZE,
};
use crate::protocol::wire::{read_exact, read_le_u64, read_u32, read_u8, write_flush};
use crate::protocol::{
    unix_now, Deadline, ErrorKind, Hello, MetaHeader, Opcode, ProtocolError, PushStatus,
    Transcript, MIN_PAYLOAD_SIZE,
};

/// Shared services a connection task needs
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    settings: Arc<ServerSettings>,
    store: ContentStore,
    hub: StreamHub,
    admission: AdmissionController,
}

impl ConnectionHandler {
    pub fn new(
        settings: Arc<ServerSettings>,
        store: ContentStore,
        hub: StreamHub,
        admission: AdmissionController,
    ) -> Self {
        Self {
            settings,
            store,
            hub,
            admission,
        }
    }

    /// Drive one connection to completion and log how it ended
    pub async fn handle<S>(&self, stream: S, peer: IpAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);

        if let Err(e) = self.serve(&mut reader, &mut writer, peer).await {
            if e.is_disconnect() {
                debug!(peer = %peer, "client disconnected");
                return;
            }
            match e.kind() {
                ErrorKind::Authentication => debug!(peer = %peer, "authentication failed: {}", e),
                ErrorKind::ProtocolViolation => warn!(peer = %peer, "protocol violation: {}", e),
                ErrorKind::ResourceExhaustion => info!(peer = %peer, "request refused: {}", e),
                ErrorKind::TimeExpired | ErrorKind::Transport => {
                    debug!(peer = %peer, "connection closed: {}", e)
                }
            }
        }
    }

    async fn serve<R, W>(&self, reader: &mut R, writer: &mut W, peer: IpAddr) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let psk = &self.settings.psk;
        let handshake = Deadline::after(self.settings.timeout, "handshake");

        let hello = Hello::read_from(reader, handshake).await?;
        let (transcript, reply) = Transcript::respond(psk, &hello)?;
        write_flush(writer, &reply.encode(), handshake).await?;
        self.admission.mark_trusted(peer);

        let byte = read_u8(reader, handshake).await?;
        let opcode = Opcode::from_byte(byte)
            .filter(|op| transcript.version().supports(*op))
            .ok_or(ProtocolError::UnknownOpcode(byte))?;
        debug!(peer = %peer, opcode = %opcode, version = %transcript.version(), "handshake complete");

        match opcode {
            Opcode::Store => self.handle_store(reader, writer, &transcript, handshake, peer).await,
            Opcode::Fetch => self.handle_fetch(reader, writer, &transcript, handshake, false, peer).await,
            Opcode::Move => self.handle_fetch(reader, writer, &transcript, handshake, true, peer).await,
            Opcode::Push => self.handle_push(reader, writer, &transcript, handshake, peer).await,
            Opcode::Pull => self.handle_pull(reader, writer, &transcript, handshake, peer).await,
        }
    }

    fn data_deadline(&self) -> Deadline {
        Deadline::after(self.settings.data_timeout, "data")
    }

    async fn handle_store<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        transcript: &Transcript,
        handshake: Deadline,
        peer: IpAddr,
    ) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let psk = &self.settings.psk;
        let caps = transcript.capabilities();
        let meta = MetaHeader::read_from(reader, caps, handshake).await?;
        let h2 = transcript.h2_store(psk, meta.timestamp, &meta.signature);
        verify_digest(&h2, &meta.digest, "h2")?;

        let max_len = self.settings.max_len;
        if max_len > 0 && meta.payload_len > max_len {
            return Err(ProtocolError::PayloadTooLarge {
                declared: meta.payload_len,
                max: max_len,
            });
        }
        let payload_len = usize::try_from(meta.payload_len)
            .ok()
            .filter(|len| *len >= MIN_PAYLOAD_SIZE)
            .ok_or_else(|| {
                ProtocolError::MalformedPayload(format!(
                    "declared payload of {} bytes",
                    meta.payload_len
                ))
            })?;

        let data = self.data_deadline();
        let mut payload = vec![0u8; payload_len];
        read_exact(reader, &mut payload, data).await?;
        verify_message(&self.settings.sign_pk, &payload, &meta.signature, "store")?;

        let timestamp = if caps.timestamps {
            meta.timestamp
        } else {
            unix_now()
        };
        let key_id = read_le_u64(&payload);
        self.store
            .store(StoredContent {
                key_id,
                timestamp,
                signature: meta.signature,
                payload: Bytes::from(payload),
            })
            .await;

        write_flush(writer, &auth3_store(psk, &h2), data).await?;
        info!(peer = %peer, bytes = payload_len, "📋 clipboard updated");
        Ok(())
    }

    async fn handle_fetch<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        transcript: &Transcript,
        handshake: Deadline,
        take: bool,
        peer: IpAddr,
    ) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let psk = &self.settings.psk;
        let opcode = if take { Opcode::Move } else { Opcode::Fetch };
        let received = read_digest(reader, handshake).await?;
        let h2 = transcript.h2_get(psk, opcode);
        verify_digest(&h2, &received, "h2")?;

        let content = if take {
            self.store.take().await
        } else {
            self.store.fetch().await
        };
        let (timestamp, signature, payload) = match content {
            Some(c) => (c.timestamp, c.signature, c.payload),
            None => (0, [0u8; SIGNATURE_SIZE], Bytes::new()),
        };
        let meta = MetaHeader {
            digest: transcript.h3_get(psk, &h2, timestamp, &signature),
            payload_len: payload.len() as u64,
            timestamp,
            signature,
        };

        let header = meta.encode(transcript.capabilities());
        self.data_deadline()
            .run(async {
                writer.write_all(&header).await?;
                writer.write_all(&payload).await?;
                writer.flush().await
            })
            .await?;
        info!(peer = %peer, opcode = %opcode, bytes = payload.len(), "clipboard sent");
        Ok(())
    }

    async fn handle_push<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        transcript: &Transcript,
        handshake: Deadline,
        peer: IpAddr,
    ) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let received = read_digest(reader, handshake).await?;
        let h2 = transcript.h2_get(&self.settings.psk, Opcode::Push);
        verify_digest(&h2, &received, "h2")?;

        let mut session = match self.hub.begin_publish() {
            Ok(session) => session,
            Err(status) => {
                write_flush(writer, &[status as u8], handshake).await?;
                info!(peer = %peer, status = ?status, "push refused");
                return Ok(());
            }
        };
        write_flush(writer, &[PushStatus::Accepted as u8], handshake).await?;

        match self.relay_stream(reader, &mut session).await {
            Ok((chunks, bytes)) => {
                let subscribers = session.live_subscribers();
                if subscribers == 0 {
                    warn!(peer = %peer, chunks, bytes, "stream relayed but every puller was dropped");
                } else {
                    info!(peer = %peer, chunks, bytes, subscribers, "📡 stream relayed");
                }
                Ok(())
            }
            Err(e) => {
                session.abort();
                Err(e)
            }
        }
    }

    /// Copy the publisher's header, frames and terminator into the session
    async fn relay_stream<R>(
        &self,
        reader: &mut R,
        session: &mut PublishSession,
    ) -> Result<(u64, u64), ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let settings = &self.settings;
        let budget = (!settings.max_stream_duration.is_zero())
            .then(|| Deadline::after(settings.max_stream_duration, "stream"));
        let frame_deadline = || {
            let data = Deadline::after(settings.data_timeout, "data");
            budget.map_or(data, |b| data.earliest(b))
        };

        let result: Result<(u64, u64), ProtocolError> = async {
            let mut header = [0u8; STREAM_HEADER_SIZE];
            read_exact(reader, &mut header, frame_deadline()).await?;
            session.relay(Bytes::copy_from_slice(&header)).await;

            let mut chunks = 0u64;
            let mut total = 0u64;
            loop {
                let deadline = frame_deadline();
                let len = read_u32(reader, deadline).await?;
                if len == END_OF_STREAM {
                    let mut frame = BytesMut::with_capacity(4 + SIGNATURE_SIZE);
                    frame.put_u32_le(END_OF_STREAM);
                    frame.resize(4 + SIGNATURE_SIZE, 0);
                    read_exact(reader, &mut frame[4..], deadline).await?;
                    session.relay(frame.freeze()).await;
                    return Ok((chunks, total));
                }

                check_chunk_len(len)?;
                total += u64::from(len);
                if settings.max_stream_bytes > 0 && total > settings.max_stream_bytes {
                    return Err(ProtocolError::StreamBudgetExceeded("bytes"));
                }

                let mut frame = BytesMut::with_capacity(4 + sealed_len(len));
                frame.put_u32_le(len);
                frame.resize(4 + sealed_len(len), 0);
                read_exact(reader, &mut frame[4..], deadline).await?;
                session.relay(frame.freeze()).await;
                chunks += 1;
            }
        }
        .await;

        result.map_err(|e| match e {
            ProtocolError::DeadlineExceeded { phase: "stream" } => {
                ProtocolError::StreamBudgetExceeded("duration")
            }
            other => other,
        })
    }

    async fn handle_pull<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        transcript: &Transcript,
        handshake: Deadline,
        peer: IpAddr,
    ) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let received = read_digest(reader, handshake).await?;
        let h2 = transcript.h2_get(&self.settings.psk, Opcode::Pull);
        verify_digest(&h2, &received, "h2")?;

        let mut subscription = self.hub.register()?;
        let wait = self.settings.ttl.max(self.settings.data_timeout);
        debug!(peer = %peer, subscriber = subscription.id(), "puller waiting");

        // Pullers never send after h2, so any read result means the peer is gone.
        let outcome = tokio::select! {
            outcome = subscription.wait_for_publisher(wait) => outcome,
            _ = reader.read_u8() => WaitOutcome::Cancelled,
        };
        match outcome {
            WaitOutcome::Released => {}
            WaitOutcome::Cancelled => {
                debug!(peer = %peer, "puller left before a stream started");
                return Ok(());
            }
            WaitOutcome::TimedOut => {
                return Err(ProtocolError::DeadlineExceeded { phase: "pull wait" })
            }
        }

        let cancel = subscription.cancellation();
        let mut forwarded = 0usize;
        let mut finished = false;
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                frame = subscription.next_frame() => frame,
            };
            let Some(frame) = frame else { break };
            write_flush(writer, &frame, self.data_deadline()).await?;
            forwarded += frame.len();
            finished = is_final_frame(&frame);
        }

        if !finished {
            debug!(peer = %peer, bytes = forwarded, "puller dropped from stream");
            let marker = ABORT_MARKER.to_le_bytes();
            let deadline = Deadline::after(self.settings.timeout, "abort");
            let _ = write_flush(writer, &marker, deadline).await;
            return Ok(());
        }
        info!(peer = %peer, bytes = forwarded, "stream forwarded");
        Ok(())
    }
}

/// Terminator or abort frame: nothing follows it in a relayed stream
fn is_final_frame(frame: &[u8]) -> bool {
    let terminator = frame.len() == 4 + SIGNATURE_SIZE && frame[..4] == END_OF_STREAM.to_le_bytes();
    terminator || frame[..] == ABORT_MARKER.to_le_bytes()
}

async fn read_digest<R>(reader: &mut R, deadline: Deadline) -> Result<Digest, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut digest = [0u8; DIGEST_SIZE];
    read_exact(reader, &mut digest, deadline).await?;
    Ok(digest)
}
