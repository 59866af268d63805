// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Keepalive and reserved-inode reporting behavior.

mod support;

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use driftfs_meta_client::{MetaClient, OpError};
use driftfs_proto::{commands, Status};
use support::{accept_and_register, init_logging, liveness_config, MockMeta};

fn be_u32s(payload: &[u8]) -> Vec<u32> {
    assert_eq!(payload.len() % 4, 0);
    payload
        .chunks_exact(4)
        .map(|raw| u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
        .collect()
}

#[test]
fn keepalive_fires_only_after_the_idle_threshold() {
    init_logging();
    let server = MockMeta::bind();
    let port = server.port();
    let idle = Duration::from_millis(150);

    let script = thread::spawn(move || {
        let mut conn = accept_and_register(&server, 61);

        let (header, _) = conn.read_frame();
        assert_eq!(header.command, commands::CM_GETATTR);
        conn.write_frame(commands::MC_GETATTR, header.correlation, &[1; 8]);
        let answered = Instant::now();

        // The very next frame must be a keepalive, and it must not show up
        // before the connection actually sat idle.
        let (header, _) = conn.read_frame();
        let waited = answered.elapsed();
        assert!(
            header.is_keepalive(),
            "expected keepalive, got command {}",
            header.command
        );
        assert!(
            waited >= Duration::from_millis(120),
            "keepalive arrived {waited:?} after the last call"
        );
        assert!(waited < Duration::from_secs(2));
        conn
    });

    let client = MetaClient::connect(liveness_config(
        port,
        idle,
        Duration::from_secs(600),
    ))
    .expect("connect");
    client
        .call(commands::CM_GETATTR, &[9])
        .expect("call succeeds");

    let _conn = script.join().unwrap();
}

#[test]
fn reserved_inode_reports_track_the_held_set_in_order() {
    init_logging();
    let server = MockMeta::bind();
    let port = server.port();
    let (first_report_tx, first_report_rx) = mpsc::channel::<()>();

    let script = thread::spawn(move || {
        let mut conn = accept_and_register(&server, 62);

        // First report with content: ascending inode numbers, one entry
        // per held inode regardless of its reference count.
        loop {
            let (header, payload) = conn.read_frame();
            if header.command != commands::CM_RESERVED_INODES || payload.is_empty() {
                continue;
            }
            assert_eq!(be_u32s(&payload), vec![4, 9, 1000]);
            break;
        }
        first_report_tx.send(()).unwrap();

        // After the last reference to inode 4 is dropped it must vanish.
        for _ in 0..20 {
            let (header, payload) = conn.read_frame();
            if header.command != commands::CM_RESERVED_INODES {
                continue;
            }
            let inodes = be_u32s(&payload);
            if inodes == vec![9, 1000] {
                return conn;
            }
            assert!(
                inodes == vec![4, 9, 1000],
                "unexpected reserved set {inodes:?}"
            );
        }
        panic!("inode 4 never left the reserved reports");
    });

    let client = MetaClient::connect(liveness_config(
        port,
        Duration::from_secs(60),
        Duration::from_millis(150),
    ))
    .expect("connect");

    client.notify_open(9);
    client.notify_open(4);
    client.notify_open(4);
    client.notify_open(1000);

    first_report_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first reserved report");
    client.notify_close(4);
    client.notify_close(4);

    let _conn = script.join().unwrap();
}

#[test]
fn refused_open_releases_the_held_reference() {
    init_logging();
    let server = MockMeta::bind();
    let port = server.port();

    let script = thread::spawn(move || {
        let mut conn = accept_and_register(&server, 63);

        let (header, payload) = conn.read_request();
        assert_eq!(header.command, commands::CM_OPEN);
        assert_eq!(&payload[..4], &42u32.to_be_bytes());
        conn.write_frame(
            commands::MC_OPEN,
            header.correlation,
            &[Status::NotAllowed.as_u8()],
        );

        // The refused inode must not linger in the reserved reports.
        for _ in 0..5 {
            let (header, payload) = conn.read_frame();
            if header.command != commands::CM_RESERVED_INODES {
                continue;
            }
            if payload.is_empty() {
                return conn;
            }
        }
        panic!("reserved reports kept a refused open");
    });

    let client = MetaClient::connect(liveness_config(
        port,
        Duration::from_secs(60),
        Duration::from_millis(150),
    ))
    .expect("connect");

    let err = client.open(42, 0, 0, 0).unwrap_err();
    assert_eq!(err, OpError::Status(Status::NotAllowed));

    let _conn = script.join().unwrap();
}
