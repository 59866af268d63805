// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Server status bytes.

use std::fmt;

/// Status byte carried in single-byte replies and registration rejections.
///
/// Unknown values decode to [`Status::Other`] so a newer server cannot
/// confuse an older mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotAllowed,
    NotFound,
    Exists,
    NotEmpty,
    InvalidName,
    QuotaExceeded,
    NoSpace,
    BadSession,
    BadCredentials,
    ChunkMissing,
    Io,
    Other(u8),
}

impl Status {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Status::Ok,
            1 => Status::NotAllowed,
            2 => Status::NotFound,
            3 => Status::Exists,
            4 => Status::NotEmpty,
            5 => Status::InvalidName,
            6 => Status::QuotaExceeded,
            7 => Status::NoSpace,
            8 => Status::BadSession,
            9 => Status::BadCredentials,
            10 => Status::ChunkMissing,
            11 => Status::Io,
            other => Status::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::NotAllowed => 1,
            Status::NotFound => 2,
            Status::Exists => 3,
            Status::NotEmpty => 4,
            Status::InvalidName => 5,
            Status::QuotaExceeded => 6,
            Status::NoSpace => 7,
            Status::BadSession => 8,
            Status::BadCredentials => 9,
            Status::ChunkMissing => 10,
            Status::Io => 11,
            Status::Other(raw) => raw,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::NotAllowed => write!(f, "operation not permitted"),
            Status::NotFound => write!(f, "no such file or directory"),
            Status::Exists => write!(f, "file exists"),
            Status::NotEmpty => write!(f, "directory not empty"),
            Status::InvalidName => write!(f, "invalid name"),
            Status::QuotaExceeded => write!(f, "quota exceeded"),
            Status::NoSpace => write!(f, "no space left"),
            Status::BadSession => write!(f, "unknown session"),
            Status::BadCredentials => write!(f, "bad credentials"),
            Status::ChunkMissing => write!(f, "chunk unavailable"),
            Status::Io => write!(f, "io error"),
            Status::Other(raw) => write!(f, "unknown status {raw}"),
        }
    }
}
