// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-process scripted metadata server used by the integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use driftfs_meta_client::{MetaClientConfig, RetryPolicy, Timeouts};
use driftfs_proto::register::{parse_register_request, ParsedRegister};
use driftfs_proto::{commands, frame, FrameHeader, HEADER_LEN};

/// How long the mock waits for the client before a test is declared hung.
const MOCK_IO_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A listening mock metadata server.
pub struct MockMeta {
    listener: TcpListener,
}

impl MockMeta {
    pub fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock metadata server");
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().expect("mock local addr").port()
    }

    pub fn accept(&self) -> ServerConn {
        let (stream, _) = self.listener.accept().expect("accept mount connection");
        stream
            .set_read_timeout(Some(MOCK_IO_TIMEOUT))
            .expect("mock read timeout");
        stream
            .set_write_timeout(Some(MOCK_IO_TIMEOUT))
            .expect("mock write timeout");
        ServerConn { stream }
    }
}

/// One accepted mount connection, server side.
pub struct ServerConn {
    stream: TcpStream,
}

impl ServerConn {
    pub fn read_frame(&mut self) -> (FrameHeader, Vec<u8>) {
        let mut raw = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut raw).expect("read frame header");
        let header = FrameHeader::parse(&raw);
        let payload_len = header.payload_len().expect("frame length below minimum");
        let mut payload = vec![0u8; payload_len];
        self.stream.read_exact(&mut payload).expect("read frame payload");
        (header, payload)
    }

    /// Next frame that is an actual request, skipping keepalives and
    /// reserved-inode reports.
    pub fn read_request(&mut self) -> (FrameHeader, Vec<u8>) {
        loop {
            let (header, payload) = self.read_frame();
            if header.is_keepalive() || header.command == commands::CM_RESERVED_INODES {
                continue;
            }
            return (header, payload);
        }
    }

    pub fn write_frame(&mut self, command: u32, correlation: u32, payload: &[u8]) {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        frame::put_frame(&mut buf, command, correlation, payload);
        self.stream.write_all(&buf).expect("write frame");
    }

    /// Write a frame whose length field lies about the payload.
    pub fn write_raw_header(&mut self, command: u32, length: u32, correlation: u32) {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        buf.put_u32(command);
        buf.put_u32(length);
        buf.put_u32(correlation);
        self.stream.write_all(&buf).expect("write raw header");
    }

    pub fn expect_register(&mut self) -> ParsedRegister {
        let (header, payload) = self.read_frame();
        assert_eq!(header.command, commands::CM_REGISTER, "expected registration");
        parse_register_request(&payload).expect("well-formed registration")
    }

    /// Grant a filesystem session: id + flags + root uid/gid.
    pub fn grant_session(&mut self, session_id: u32, flags: u8, root_uid: u32, root_gid: u32) {
        let mut payload = BytesMut::with_capacity(13);
        payload.put_u32(session_id);
        payload.put_u8(flags);
        payload.put_u32(root_uid);
        payload.put_u32(root_gid);
        self.write_frame(commands::MC_REGISTER, 0, &payload);
    }

    /// Grant a meta session: id + flags only.
    pub fn grant_meta_session(&mut self, session_id: u32, flags: u8) {
        let mut payload = BytesMut::with_capacity(5);
        payload.put_u32(session_id);
        payload.put_u8(flags);
        self.write_frame(commands::MC_REGISTER, 0, &payload);
    }

    /// Bare success acknowledgement, as sent for accepted reconnects.
    pub fn ack_register(&mut self) {
        self.write_frame(commands::MC_REGISTER, 0, &[0]);
    }

    /// Refuse the registration with a status byte.
    pub fn reject_register(&mut self, status: u8) {
        self.write_frame(commands::MC_REGISTER, 0, &[status]);
    }

    pub fn send_challenge(&mut self, challenge: &[u8; 32]) {
        self.write_frame(commands::MC_REGISTER, 0, challenge);
    }
}

/// Accept a mount, expect a fresh filesystem registration and grant it.
pub fn accept_and_register(server: &MockMeta, session_id: u32) -> ServerConn {
    let mut conn = server.accept();
    let parsed = conn.expect_register();
    assert_eq!(parsed.kind, driftfs_proto::register::KIND_NEW_SESSION);
    conn.grant_session(session_id, 0, 0, 0);
    conn
}

/// Accept a reconnecting mount, assert it re-presents `session_id`, ack it.
pub fn accept_and_ack_reconnect(server: &MockMeta, session_id: u32) -> ServerConn {
    let mut conn = server.accept();
    let parsed = conn.expect_register();
    assert_eq!(parsed.kind, driftfs_proto::register::KIND_RECONNECT);
    assert_eq!(parsed.session_id, Some(session_id));
    conn.ack_register();
    conn
}

/// Client configuration with short deadlines so fault paths run in
/// milliseconds. Liveness traffic is pushed out of the way unless a test
/// tightens it.
pub fn fast_config(port: u16) -> MetaClientConfig {
    fast_config_with_retry(
        port,
        RetryPolicy {
            attempts: 5,
            pause: Duration::from_millis(25),
        },
    )
}

/// [`fast_config`] with the liveness reporter cadence under test control.
pub fn liveness_config(
    port: u16,
    keepalive_idle: Duration,
    reserved_interval: Duration,
) -> MetaClientConfig {
    MetaClientConfig::builder("127.0.0.1", port)
        .info("itest:/mnt/drift")
        .timeouts(Timeouts {
            connect: Duration::from_millis(500),
            write: Duration::from_millis(500),
            header: Duration::from_secs(5),
            payload: Duration::from_millis(500),
        })
        .retry(RetryPolicy {
            attempts: 5,
            pause: Duration::from_millis(25),
        })
        .reconnect_delay(Duration::from_millis(25))
        .liveness_tick(Duration::from_millis(20))
        .keepalive_idle(keepalive_idle)
        .reserved_interval(reserved_interval)
        .build()
        .expect("test config")
}

/// [`fast_config`] with an explicit retry budget.
pub fn fast_config_with_retry(port: u16, retry: RetryPolicy) -> MetaClientConfig {
    MetaClientConfig::builder("127.0.0.1", port)
        .info("itest:/mnt/drift")
        .timeouts(Timeouts {
            connect: Duration::from_millis(500),
            write: Duration::from_millis(500),
            header: Duration::from_secs(5),
            payload: Duration::from_millis(500),
        })
        .retry(retry)
        .reconnect_delay(Duration::from_millis(25))
        .liveness_tick(Duration::from_millis(20))
        .keepalive_idle(Duration::from_secs(60))
        .reserved_interval(Duration::from_secs(600))
        .build()
        .expect("test config")
}
