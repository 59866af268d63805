// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the metadata-server client.

use std::io;

use driftfs_proto::{Status, WireError};

/// The only failure surfaced from [`crate::MetaClient::call`]. Everything
/// below the dispatcher is either recovered by the reconnect cycle or
/// collapses into one of these after the retry budget runs out.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The server rejected a reconnect; the session is gone for good and
    /// every further call fails immediately.
    #[error("session lost")]
    SessionLost,
    /// The bounded retry budget was exhausted without a matching reply.
    #[error("retries exhausted")]
    RetriesExhausted,
}

/// Registration failure at mount startup, surfaced directly to the caller.
#[derive(thiserror::Error, Debug)]
pub enum RegisterError {
    #[error("cannot resolve metadata server address {0}")]
    Resolve(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed registration reply: {0}")]
    Wire(#[from] WireError),
    #[error("unexpected reply command {0}")]
    UnexpectedReply(u32),
    #[error("registration rejected: {0}")]
    Rejected(Status),
}

/// Failure of a typed metadata operation.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server answered with a non-ok status byte.
    #[error("server status: {0}")]
    Status(Status),
    /// The reply had an impossible shape; the connection is faulted.
    #[error("malformed reply")]
    BadReply,
    /// Directory entry names are limited to 255 bytes on the wire.
    #[error("name too long")]
    NameTooLong,
}
