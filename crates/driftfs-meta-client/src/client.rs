// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The client handle and the request dispatcher.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use bytes::Bytes;
use driftfs_proto::{commands, frame};
use tracing::{debug, warn};

use crate::acquired::AcquiredInodes;
use crate::config::MetaClientConfig;
use crate::conn::{self, ConnState, LinkState};
use crate::error::{RegisterError, TransportError};
use crate::liveness;
use crate::receiver;
use crate::slot::{SlotOutcome, SlotRegistry};
use crate::stats::{StatsSnapshot, TransportStats};

/// State shared between the client handles, the receiver loop and the
/// liveness reporter.
pub(crate) struct Shared {
    pub(crate) config: MetaClientConfig,
    pub(crate) addr: SocketAddr,
    pub(crate) conn: Mutex<ConnState>,
    pub(crate) slots: SlotRegistry,
    pub(crate) acquired: AcquiredInodes,
    pub(crate) stats: TransportStats,
    grant: MountGrant,
}

/// What the server granted this mount at registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MountGrant {
    pub flags: u8,
    pub root_uid: u32,
    pub root_gid: u32,
    pub mapped_uid: u32,
    pub mapped_gid: u32,
}

/// Where this mount's session lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLocation {
    pub ip: IpAddr,
    pub port: u16,
    pub session_id: u32,
}

/// A matched reply returned by [`MetaClient::call`].
#[derive(Clone, Debug)]
pub struct Reply {
    pub command: u32,
    pub payload: Bytes,
}

/// Handle to the single shared connection with the metadata server.
///
/// Cheap to clone; every filesystem-operation thread uses the same handle
/// (or a clone) and multiplexes over one socket. The background threads
/// stop once the last handle is dropped.
#[derive(Clone)]
pub struct MetaClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MetaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaClient")
            .field("addr", &self.shared.addr)
            .finish_non_exhaustive()
    }
}

impl MetaClient {
    /// Register with the metadata server and start the receiver and
    /// liveness threads. Registration failures are surfaced directly; no
    /// retry happens here.
    pub fn connect(config: MetaClientConfig) -> Result<Self, RegisterError> {
        let addr = resolve(&config)?;
        let (stream, grant) = conn::establish(addr, &config)?;

        let mount_grant = MountGrant {
            flags: grant.flags,
            root_uid: grant.root.map_or(0, |(uid, _)| uid),
            root_gid: grant.root.map_or(0, |(_, gid)| gid),
            mapped_uid: grant.remap.map_or(0, |(uid, _)| uid),
            mapped_gid: grant.remap.map_or(0, |(_, gid)| gid),
        };
        let shared = Arc::new(Shared {
            conn: Mutex::new(ConnState::new(stream, grant.session_id)),
            addr,
            config,
            slots: SlotRegistry::new(),
            acquired: AcquiredInodes::default(),
            stats: TransportStats::default(),
            grant: mount_grant,
        });

        spawn_background(&shared)?;
        Ok(Self { shared })
    }

    /// Issue one request and block until the matching reply arrives or the
    /// retry budget is exhausted. Transient transport faults and protocol
    /// violations are absorbed by the bounded retry loop; the caller only
    /// ever sees [`TransportError`].
    pub fn call(&self, command: u32, payload: &[u8]) -> Result<Reply, TransportError> {
        let expected = commands::reply_for(command);
        let slot = self.shared.slots.for_current_thread();

        {
            let mut inner = slot.inner.lock().unwrap();
            inner.prepare_request(frame::HEADER_LEN + payload.len());
            frame::put_frame(&mut inner.request, command, slot.correlation, payload);
        }

        let retry = self.shared.config.retry;
        for attempt in 0..retry.attempts {
            if attempt > 0 {
                debug!(attempt, command, "retrying metadata call");
            }

            let rx = {
                let mut conn = self.shared.conn.lock().unwrap();
                if conn.session_lost {
                    return Err(TransportError::SessionLost);
                }
                if conn.stream.is_none() {
                    drop(conn);
                    std::thread::sleep(retry.pause);
                    continue;
                }
                let mut inner = slot.inner.lock().unwrap();
                let rx = inner.arm();
                match conn.write_frame(&inner.request) {
                    Ok(()) => {
                        self.shared.stats.note_packet_sent(inner.request.len());
                        inner.sent = true;
                        conn.last_write = Instant::now();
                        rx
                    }
                    Err(err) => {
                        warn!(error = %err, command, "request write failed");
                        conn.fault();
                        drop(inner);
                        drop(conn);
                        std::thread::sleep(retry.pause);
                        continue;
                    }
                }
            };

            match rx.recv() {
                Ok(SlotOutcome::Reply {
                    command: reply_command,
                    payload,
                }) => {
                    if reply_command == expected {
                        return Ok(Reply {
                            command: reply_command,
                            payload,
                        });
                    }
                    // The stream matched our correlation id but answered a
                    // different request; the framing cannot be trusted.
                    warn!(
                        expected,
                        got = reply_command,
                        "reply command mismatch"
                    );
                    self.fault_connection();
                    std::thread::sleep(retry.pause);
                }
                Ok(SlotOutcome::Fault) | Err(_) => {
                    std::thread::sleep(retry.pause);
                }
            }
        }
        Err(TransportError::RetriesExhausted)
    }

    /// Record that the filesystem layer opened `inode`.
    pub fn notify_open(&self, inode: u32) {
        self.shared.acquired.acquire(inode);
    }

    /// Record that the filesystem layer released one open reference.
    pub fn notify_close(&self, inode: u32) {
        self.shared.acquired.release(inode);
    }

    /// Server endpoint and session id of this mount.
    pub fn session_location(&self) -> SessionLocation {
        let session_id = self.shared.conn.lock().unwrap().session_id;
        SessionLocation {
            ip: self.shared.addr.ip(),
            port: self.shared.addr.port(),
            session_id,
        }
    }

    /// Flags and identity mapping granted at registration.
    pub fn mount_grant(&self) -> MountGrant {
        self.shared.grant
    }

    pub fn link_state(&self) -> LinkState {
        self.shared.conn.lock().unwrap().link_state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub(crate) fn fault_connection(&self) {
        self.shared.conn.lock().unwrap().fault();
    }
}

fn resolve(config: &MetaClientConfig) -> Result<SocketAddr, RegisterError> {
    let endpoint = (config.host.as_str(), config.port);
    endpoint
        .to_socket_addrs()
        .map_err(|_| RegisterError::Resolve(format!("{}:{}", config.host, config.port)))?
        .next()
        .ok_or_else(|| RegisterError::Resolve(format!("{}:{}", config.host, config.port)))
}

fn spawn_background(shared: &Arc<Shared>) -> Result<(), RegisterError> {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    std::thread::Builder::new()
        .name("driftfs-meta-recv".to_string())
        .spawn({
            let weak = weak.clone();
            move || receiver::run(weak)
        })?;
    std::thread::Builder::new()
        .name("driftfs-meta-live".to_string())
        .spawn(move || liveness::run(weak))?;
    Ok(())
}
