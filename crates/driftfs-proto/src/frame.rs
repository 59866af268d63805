// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The 12-byte frame header and frame encoding.
//!
//! Every frame on the wire — requests, replies, keepalives, registration —
//! uses the same header. All integers are big-endian. The `length` field
//! counts the correlation id, so it is always `payload + 4`.

use bytes::{BufMut, BytesMut};

use crate::commands;

/// Size of the fixed frame header: command, length, correlation id.
pub const HEADER_LEN: usize = 12;

/// A parsed frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub command: u32,
    pub length: u32,
    pub correlation: u32,
}

impl FrameHeader {
    /// Parse a header from exactly [`HEADER_LEN`] bytes.
    pub fn parse(raw: &[u8; HEADER_LEN]) -> Self {
        let command = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let length = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let correlation = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        Self {
            command,
            length,
            correlation,
        }
    }

    /// Payload size after the correlation id, or `None` when the length
    /// field is undersized (`length < 4` is a protocol violation).
    pub fn payload_len(&self) -> Option<usize> {
        self.length.checked_sub(4).map(|len| len as usize)
    }

    /// A keepalive frame: `NOP` command with the expected empty payload.
    pub fn is_keepalive(&self) -> bool {
        self.command == commands::NOP && self.length == 4
    }
}

/// Append a frame header for a payload of `payload_len` bytes.
pub fn put_header(buf: &mut BytesMut, command: u32, correlation: u32, payload_len: usize) {
    buf.put_u32(command);
    buf.put_u32(payload_len as u32 + 4);
    buf.put_u32(correlation);
}

/// Append a complete frame: header plus payload bytes.
pub fn put_frame(buf: &mut BytesMut, command: u32, correlation: u32, payload: &[u8]) {
    put_header(buf, command, correlation, payload.len());
    buf.put_slice(payload);
}
