// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Client configuration.

use std::time::Duration;

use driftfs_proto::register;

/// Socket and protocol deadlines. Every read and write on the connection
/// is bounded by one of these; nothing blocks indefinitely.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    /// Establishing the TCP connection.
    pub connect: Duration,
    /// Any single frame write.
    pub write: Duration,
    /// Waiting for the next reply header in the receiver loop.
    pub header: Duration,
    /// Reading a reply payload once its header arrived.
    pub payload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            write: Duration::from_secs(1),
            header: Duration::from_secs(10),
            payload: Duration::from_secs(1),
        }
    }
}

/// The bounded retry contract of the dispatcher: a fixed attempt budget
/// with a fixed pause between attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            pause: Duration::from_secs(1),
        }
    }
}

/// Configuration for [`crate::MetaClient::connect`].
#[derive(Clone, Debug)]
pub struct MetaClientConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) info: String,
    pub(crate) subfolder: String,
    pub(crate) password_digest: Option<[u8; register::PROOF_LEN]>,
    pub(crate) meta: bool,
    pub(crate) timeouts: Timeouts,
    pub(crate) retry: RetryPolicy,
    pub(crate) reconnect_delay: Duration,
    pub(crate) tick: Duration,
    pub(crate) keepalive_idle: Duration,
    pub(crate) reserved_interval: Duration,
}

impl MetaClientConfig {
    /// Start building configuration for a mount talking to `host:port`.
    pub fn builder(host: impl Into<String>, port: u16) -> MetaClientConfigBuilder {
        MetaClientConfigBuilder {
            host: host.into(),
            port,
            info: None,
            subfolder: "/".to_string(),
            password_digest: None,
            meta: false,
            timeouts: Timeouts::default(),
            retry: RetryPolicy::default(),
            reconnect_delay: Duration::from_secs(2),
            tick: Duration::from_secs(1),
            keepalive_idle: Duration::from_secs(2),
            reserved_interval: Duration::from_secs(60),
        }
    }
}

/// Builder for [`MetaClientConfig`].
pub struct MetaClientConfigBuilder {
    host: String,
    port: u16,
    info: Option<String>,
    subfolder: String,
    password_digest: Option<[u8; register::PROOF_LEN]>,
    meta: bool,
    timeouts: Timeouts,
    retry: RetryPolicy,
    reconnect_delay: Duration,
    tick: Duration,
    keepalive_idle: Duration,
    reserved_interval: Duration,
}

/// Invalid configuration detected at build time.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("metadata server host missing")]
    HostMissing,
    #[error("mount info string missing")]
    InfoMissing,
    #[error("subfolder must be an absolute path")]
    SubfolderNotAbsolute,
    #[error("retry budget must be at least one attempt")]
    EmptyRetryBudget,
}

impl MetaClientConfigBuilder {
    /// Human-readable mount description reported to the server (shown in
    /// its session listings).
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Export subtree to mount instead of the filesystem root.
    pub fn subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.subfolder = subfolder.into();
        self
    }

    /// Authenticate with a password. Only its digest is retained.
    pub fn password(mut self, password: &str) -> Self {
        self.password_digest = Some(register::secret_digest(password.as_bytes()));
        self
    }

    /// Authenticate with a pre-computed secret digest.
    pub fn password_digest(mut self, digest: [u8; register::PROOF_LEN]) -> Self {
        self.password_digest = Some(digest);
        self
    }

    /// Register a meta (trash-handling) session instead of a filesystem
    /// session.
    pub fn meta_session(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Delay between reconnect attempts while the server is unreachable.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Cadence of the liveness reporter loop.
    pub fn liveness_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Idle time after which the reporter emits a keepalive frame.
    pub fn keepalive_idle(mut self, idle: Duration) -> Self {
        self.keepalive_idle = idle;
        self
    }

    /// Interval between reserved-inode reports.
    pub fn reserved_interval(mut self, interval: Duration) -> Self {
        self.reserved_interval = interval;
        self
    }

    /// Finalise the configuration.
    pub fn build(self) -> Result<MetaClientConfig, ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::HostMissing);
        }
        let info = self.info.ok_or(ConfigError::InfoMissing)?;
        if info.is_empty() {
            return Err(ConfigError::InfoMissing);
        }
        if !self.subfolder.starts_with('/') {
            return Err(ConfigError::SubfolderNotAbsolute);
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::EmptyRetryBudget);
        }
        Ok(MetaClientConfig {
            host: self.host,
            port: self.port,
            info,
            subfolder: self.subfolder,
            password_digest: self.password_digest,
            meta: self.meta,
            timeouts: self.timeouts,
            retry: self.retry,
            reconnect_delay: self.reconnect_delay,
            tick: self.tick,
            keepalive_idle: self.keepalive_idle,
            reserved_interval: self.reserved_interval,
        })
    }
}
