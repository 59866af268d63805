// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Connection state and the registration handshakes.
//!
//! Everything the dispatcher, receiver loop and liveness reporter share
//! about the socket lives in [`ConnState`] behind a single mutex: the
//! stream itself, the fault flag, the last-write timestamp and the session
//! identity. Exactly one thread writes to the socket at a time (whoever
//! holds the lock); the receiver loop is the only reader.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Instant;

use bytes::BytesMut;
use driftfs_proto::register::{
    self, parse_challenge, parse_register_reply, RegisterOutcome, RegisterRequest, SessionGrant,
};
use driftfs_proto::{commands, FrameHeader, WireError, HEADER_LEN};
use tracing::{debug, error, info, warn};

use crate::config::MetaClientConfig;
use crate::error::RegisterError;
use crate::stats::TransportStats;

/// Registration replies are tiny; anything larger is a framing error.
const MAX_REGISTER_REPLY: usize = 256;

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Faulted,
    Disconnected,
    /// The server rejected a reconnect; terminal for this mount.
    SessionLost,
}

#[derive(Debug)]
pub(crate) struct ConnState {
    pub(crate) stream: Option<TcpStream>,
    /// Sole trigger for teardown-and-reconnect; cleared only by the
    /// receiver loop after the teardown completed.
    pub(crate) faulted: bool,
    pub(crate) last_write: Instant,
    pub(crate) session_id: u32,
    pub(crate) session_lost: bool,
}

impl ConnState {
    pub(crate) fn new(stream: TcpStream, session_id: u32) -> Self {
        Self {
            stream: Some(stream),
            faulted: false,
            last_write: Instant::now(),
            session_id,
            session_lost: false,
        }
    }

    pub(crate) fn fault(&mut self) {
        self.faulted = true;
    }

    pub(crate) fn close(&mut self) {
        self.stream = None;
    }

    /// Write a full frame. Short writes surface as errors through the
    /// socket write timeout; the caller decides whether to fault.
    pub(crate) fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no connection"))?;
        stream.write_all(frame)
    }

    pub(crate) fn link_state(&self) -> LinkState {
        if self.session_lost {
            LinkState::SessionLost
        } else if self.faulted {
            LinkState::Faulted
        } else if self.stream.is_none() {
            LinkState::Disconnected
        } else {
            LinkState::Connected
        }
    }
}

/// Open a socket to the metadata server with the configured deadlines.
fn open_socket(addr: SocketAddr, config: &MetaClientConfig) -> io::Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, config.timeouts.connect)?;
    if let Err(err) = stream.set_nodelay(true) {
        warn!(error = %err, "cannot disable nagling on metadata connection");
    }
    stream.set_write_timeout(Some(config.timeouts.write))?;
    stream.set_read_timeout(Some(config.timeouts.payload))?;
    Ok(stream)
}

/// Read one registration reply frame synchronously. Used only before the
/// receiver loop owns the socket.
fn read_register_frame(stream: &mut TcpStream) -> Result<Vec<u8>, RegisterError> {
    let mut raw = [0u8; HEADER_LEN];
    stream.read_exact(&mut raw)?;
    let header = FrameHeader::parse(&raw);
    if header.command != commands::MC_REGISTER {
        return Err(RegisterError::UnexpectedReply(header.command));
    }
    let payload_len = header
        .payload_len()
        .ok_or(WireError::Malformed("registration reply length"))?;
    if payload_len > MAX_REGISTER_REPLY {
        return Err(RegisterError::Wire(WireError::Malformed(
            "oversized registration reply",
        )));
    }
    let mut payload = vec![0u8; payload_len];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

fn send_register(stream: &mut TcpStream, request: &RegisterRequest<'_>) -> io::Result<()> {
    let mut frame = BytesMut::new();
    request.encode(&mut frame);
    stream.write_all(&frame)
}

/// Run the challenge exchange and derive the password proof.
fn solve_challenge(
    stream: &mut TcpStream,
    secret: &[u8; register::PROOF_LEN],
) -> Result<[u8; register::PROOF_LEN], RegisterError> {
    send_register(stream, &RegisterRequest::Challenge)?;
    let payload = read_register_frame(stream)?;
    let challenge = parse_challenge(&payload)?;
    Ok(register::password_proof(&challenge, secret))
}

/// First registration at mount startup: open the socket, optionally run
/// the challenge exchange, request a fresh session. Not retried here — the
/// mount-startup caller decides whether to abort the process.
pub(crate) fn establish(
    addr: SocketAddr,
    config: &MetaClientConfig,
) -> Result<(TcpStream, SessionGrant), RegisterError> {
    let mut stream = open_socket(addr, config)?;

    let proof = match config.password_digest.as_ref() {
        Some(secret) => Some(solve_challenge(&mut stream, secret)?),
        None => None,
    };

    let request = if config.meta {
        RegisterRequest::NewMetaSession {
            info: &config.info,
            proof,
        }
    } else {
        RegisterRequest::NewSession {
            info: &config.info,
            subfolder: &config.subfolder,
            proof,
        }
    };
    send_register(&mut stream, &request)?;

    let payload = read_register_frame(&mut stream)?;
    match parse_register_reply(&payload)? {
        RegisterOutcome::Granted(grant) => {
            if config.meta == grant.root.is_some() {
                return Err(RegisterError::Wire(WireError::Malformed(
                    "session grant shape does not match session kind",
                )));
            }
            info!(
                session_id = grant.session_id,
                flags = grant.flags,
                "registered with metadata server"
            );
            Ok((stream, grant))
        }
        RegisterOutcome::Rejected(status) => Err(RegisterError::Rejected(status)),
        RegisterOutcome::Ack => Err(RegisterError::Wire(WireError::Malformed(
            "bare acknowledgement for new session",
        ))),
    }
}

/// Reconnect registration: re-present the session id assigned at startup.
/// Never derives a new session. On explicit rejection the session is
/// marked lost and no further attempts are made; on transport trouble the
/// connection simply stays down for the caller to retry later.
pub(crate) fn reconnect(
    conn: &mut ConnState,
    addr: SocketAddr,
    config: &MetaClientConfig,
    stats: &TransportStats,
) {
    if conn.session_id == 0 {
        warn!("cannot reconnect: no session was ever established");
        return;
    }

    let mut stream = match open_socket(addr, config) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%addr, error = %err, "cannot reach metadata server");
            return;
        }
    };

    let request = RegisterRequest::Reconnect {
        session_id: conn.session_id,
    };
    if let Err(err) = send_register(&mut stream, &request) {
        warn!(error = %err, "reconnect registration write failed");
        return;
    }
    let payload = match read_register_frame(&mut stream) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "reconnect registration read failed");
            return;
        }
    };
    match parse_register_reply(&payload) {
        Ok(RegisterOutcome::Ack) => {
            debug!(session_id = conn.session_id, "re-registered with metadata server");
            stats.note_reconnect();
            conn.stream = Some(stream);
            conn.last_write = Instant::now();
        }
        Ok(RegisterOutcome::Rejected(status)) => {
            error!(%status, "metadata server rejected session; mount is dead until restarted");
            conn.session_lost = true;
        }
        Ok(RegisterOutcome::Granted(_)) => {
            warn!("unexpected session grant on reconnect");
        }
        Err(err) => {
            warn!(error = %err, "malformed reconnect reply");
        }
    }
}
