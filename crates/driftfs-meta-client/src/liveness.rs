// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The liveness reporter.
//!
//! Once per tick: send a keepalive if the connection sat idle past the
//! threshold, and at a longer interval re-announce every inode this mount
//! still holds open so the server keeps its leases alive across quiet
//! periods and reconnects. Shares the connection write lock with the
//! dispatcher; write failures raise the same fault flag.

use std::sync::Weak;
use std::time::Instant;

use bytes::{BufMut, BytesMut};
use driftfs_proto::{commands, frame, HEADER_LEN};
use tracing::{debug, warn};

use crate::client::Shared;

pub(crate) fn run(shared: Weak<Shared>) {
    let mut last_reserved_report = Instant::now();
    loop {
        let Some(ctx) = shared.upgrade() else { return };
        let tick = ctx.config.tick;

        {
            let mut conn = ctx.conn.lock().unwrap();
            if conn.session_lost {
                return;
            }
            if !conn.faulted && conn.stream.is_some() {
                let now = Instant::now();

                if now.duration_since(conn.last_write) > ctx.config.keepalive_idle {
                    let mut keepalive = BytesMut::with_capacity(HEADER_LEN);
                    frame::put_frame(&mut keepalive, commands::NOP, 0, &[]);
                    match conn.write_frame(&keepalive) {
                        Ok(()) => {
                            ctx.stats.note_packet_sent(keepalive.len());
                            conn.last_write = now;
                        }
                        Err(err) => {
                            warn!(error = %err, "keepalive write failed");
                            conn.fault();
                        }
                    }
                }

                if !conn.faulted
                    && now.duration_since(last_reserved_report) > ctx.config.reserved_interval
                {
                    let inodes = ctx.acquired.snapshot();
                    let mut report = BytesMut::with_capacity(HEADER_LEN + inodes.len() * 4);
                    frame::put_header(&mut report, commands::CM_RESERVED_INODES, 0, inodes.len() * 4);
                    for inode in &inodes {
                        report.put_u32(*inode);
                    }
                    match conn.write_frame(&report) {
                        Ok(()) => {
                            debug!(held = inodes.len(), "reported reserved inodes");
                            ctx.stats.note_packet_sent(report.len());
                        }
                        Err(err) => {
                            warn!(error = %err, "reserved-inode report write failed");
                            conn.fault();
                        }
                    }
                    last_reserved_report = now;
                }
            }
        }

        drop(ctx);
        std::thread::sleep(tick);
    }
}
