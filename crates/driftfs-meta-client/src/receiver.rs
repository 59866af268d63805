// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The receiver loop: sole reader of the metadata socket.
//!
//! Steady state is a bounded header read, a slot lookup by correlation id
//! and a bounded payload read into that slot. Any irregularity — peer
//! close, short read, undersized length, unknown correlation id — faults
//! the connection; the loop then tears the socket down, fails every
//! outstanding slot so its caller can retry, and runs the reconnect
//! registration until the server is back or the session is declared lost.

use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::sync::Weak;

use driftfs_proto::{FrameHeader, HEADER_LEN};
use tracing::{debug, warn};

use crate::client::Shared;
use crate::conn;
use crate::slot::SlotOutcome;

enum Flow {
    Continue,
    /// Server unreachable; pause before the next connect attempt.
    AwaitServer,
    /// Session terminally lost or client dropped.
    Stop,
}

pub(crate) fn run(shared: Weak<Shared>) {
    let mut reader: Option<TcpStream> = None;
    loop {
        let Some(ctx) = shared.upgrade() else { return };
        match poll_once(&ctx, &mut reader) {
            Flow::Continue => {}
            Flow::AwaitServer => {
                let delay = ctx.config.reconnect_delay;
                drop(ctx);
                std::thread::sleep(delay);
            }
            Flow::Stop => return,
        }
    }
}

fn fault(ctx: &Shared) {
    ctx.conn.lock().unwrap().fault();
}

fn poll_once(ctx: &Shared, reader: &mut Option<TcpStream>) -> Flow {
    {
        let mut conn = ctx.conn.lock().unwrap();
        if conn.faulted {
            conn.close();
            *reader = None;
            ctx.slots.fail_outstanding();
            conn.faulted = false;
            debug!("tore down faulted metadata connection");
        }
        if conn.session_lost {
            return Flow::Stop;
        }
        if conn.stream.is_none() {
            conn::reconnect(&mut conn, ctx.addr, &ctx.config, &ctx.stats);
            if conn.session_lost {
                return Flow::Stop;
            }
        }
        match conn.stream.as_ref() {
            Some(stream) => {
                if reader.is_none() {
                    match stream.try_clone() {
                        Ok(clone) => *reader = Some(clone),
                        Err(err) => {
                            warn!(error = %err, "cannot clone metadata socket for reading");
                            conn.fault();
                            return Flow::Continue;
                        }
                    }
                }
            }
            None => return Flow::AwaitServer,
        }
    }

    let Some(stream) = reader.as_mut() else {
        return Flow::Continue;
    };

    if stream
        .set_read_timeout(Some(ctx.config.timeouts.header))
        .is_err()
    {
        fault(ctx);
        return Flow::Continue;
    }
    let mut raw = [0u8; HEADER_LEN];
    if let Err(err) = stream.read_exact(&mut raw) {
        if err.kind() == ErrorKind::UnexpectedEof {
            warn!("metadata server closed the connection");
        } else {
            warn!(error = %err, "reply header read failed");
        }
        fault(ctx);
        return Flow::Continue;
    }
    ctx.stats.note_bytes_received(HEADER_LEN);

    let header = FrameHeader::parse(&raw);
    if header.is_keepalive() {
        ctx.stats.note_packet_received();
        return Flow::Continue;
    }
    let Some(payload_len) = header.payload_len() else {
        warn!(length = header.length, "frame length below minimum");
        fault(ctx);
        return Flow::Continue;
    };
    // An id we cannot place means the stream can no longer be trusted for
    // demultiplexing.
    let Some(slot) = ctx.slots.by_correlation(header.correlation) else {
        warn!(
            correlation = header.correlation,
            "reply for unknown correlation id"
        );
        fault(ctx);
        return Flow::Continue;
    };

    if stream
        .set_read_timeout(Some(ctx.config.timeouts.payload))
        .is_err()
    {
        fault(ctx);
        return Flow::Continue;
    }
    let mut inner = slot.inner.lock().unwrap();
    inner.prepare_response(payload_len);
    if payload_len > 0 {
        if let Err(err) = stream.read_exact(&mut inner.response[..]) {
            drop(inner);
            warn!(error = %err, "reply payload read failed");
            fault(ctx);
            return Flow::Continue;
        }
        ctx.stats.note_bytes_received(payload_len);
    }
    ctx.stats.note_packet_received();
    let payload = inner.response.split_to(payload_len).freeze();
    inner.complete(SlotOutcome::Reply {
        command: header.command,
        payload,
    });
    Flow::Continue
}
