// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! DriftFS metadata-server client.
//!
//! The mount process talks to exactly one metadata server over a single
//! persistent TCP connection shared by every filesystem-operation thread.
//! This crate provides that connection: request/response correlation over
//! per-thread slots, a receiver loop that demultiplexes replies, automatic
//! reconnection with session continuity, and a background reporter that
//! keeps the connection and the server-side open-file leases alive.
//!
//! ```no_run
//! use driftfs_meta_client::{MetaClient, MetaClientConfig};
//!
//! let config = MetaClientConfig::builder("metad.example", 9421)
//!     .info("workstation:/mnt/drift")
//!     .subfolder("/projects")
//!     .build()?;
//! let client = MetaClient::connect(config)?;
//!
//! let usage = client.statfs()?;
//! println!("{} bytes free", usage.available);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod acquired;
mod client;
mod config;
mod conn;
mod error;
mod liveness;
mod ops;
mod receiver;
mod slot;
mod stats;

pub use client::{MetaClient, MountGrant, Reply, SessionLocation};
pub use config::{ConfigError, MetaClientConfig, MetaClientConfigBuilder, RetryPolicy, Timeouts};
pub use conn::LinkState;
pub use error::{OpError, RegisterError, TransportError};
pub use ops::{ChunkLocation, StatFs};
pub use stats::StatsSnapshot;

// The protocol crate is part of the public API surface (command ids,
// status codes, attribute blobs).
pub use driftfs_proto as proto;
