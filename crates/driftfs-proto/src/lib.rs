// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! DriftFS wire protocol — framing and message codecs
//!
//! This crate defines the frame header, the command-id space, the
//! registration payloads and the status codes shared by the mount client
//! and the metadata server. It is pure: no I/O, no threads, no state.

pub mod commands;
pub mod frame;
pub mod register;
pub mod status;
pub mod wire;

pub use frame::{FrameHeader, HEADER_LEN};
pub use register::{
    ParsedRegister, RegisterOutcome, RegisterRequest, SessionGrant, CAPABILITY_BLOB,
};
pub use status::Status;
pub use wire::{Reader, WireError};

/// Length of the opaque attribute blob attached to inode-returning replies.
pub const ATTR_LEN: usize = 35;

/// File attributes as carried on the wire. The mount's filesystem layer
/// decodes these; the transport passes them through untouched.
pub type Attr = [u8; ATTR_LEN];
