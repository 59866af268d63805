// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Command-id space.
//!
//! Requests travelling client → metadata server use even ids; the matching
//! reply is always `request + 1`. Frames that are not replies to a specific
//! call (keepalive, reserved-inode reports, registration) carry correlation
//! id 0.

/// Keepalive. Zero-length logical payload, never routed to a request slot.
pub const NOP: u32 = 0;

/// Session registration (new, meta, reconnect and challenge kinds).
pub const CM_REGISTER: u32 = 400;
pub const MC_REGISTER: u32 = 401;

/// Periodic report of inodes this mount still holds open. No reply.
pub const CM_RESERVED_INODES: u32 = 402;

// Filesystem operations.
pub const CM_STATFS: u32 = 410;
pub const MC_STATFS: u32 = 411;
pub const CM_ACCESS: u32 = 412;
pub const MC_ACCESS: u32 = 413;
pub const CM_LOOKUP: u32 = 414;
pub const MC_LOOKUP: u32 = 415;
pub const CM_GETATTR: u32 = 416;
pub const MC_GETATTR: u32 = 417;
pub const CM_SETATTR: u32 = 418;
pub const MC_SETATTR: u32 = 419;
pub const CM_TRUNCATE: u32 = 420;
pub const MC_TRUNCATE: u32 = 421;
pub const CM_READLINK: u32 = 422;
pub const MC_READLINK: u32 = 423;
pub const CM_SYMLINK: u32 = 424;
pub const MC_SYMLINK: u32 = 425;
pub const CM_MKNOD: u32 = 426;
pub const MC_MKNOD: u32 = 427;
pub const CM_MKDIR: u32 = 428;
pub const MC_MKDIR: u32 = 429;
pub const CM_UNLINK: u32 = 430;
pub const MC_UNLINK: u32 = 431;
pub const CM_RMDIR: u32 = 432;
pub const MC_RMDIR: u32 = 433;
pub const CM_RENAME: u32 = 434;
pub const MC_RENAME: u32 = 435;
pub const CM_LINK: u32 = 436;
pub const MC_LINK: u32 = 437;
pub const CM_READDIR: u32 = 438;
pub const MC_READDIR: u32 = 439;
pub const CM_OPEN: u32 = 440;
pub const MC_OPEN: u32 = 441;
pub const CM_READ_CHUNK: u32 = 442;
pub const MC_READ_CHUNK: u32 = 443;
pub const CM_WRITE_CHUNK: u32 = 444;
pub const MC_WRITE_CHUNK: u32 = 445;
pub const CM_WRITE_END: u32 = 446;
pub const MC_WRITE_END: u32 = 447;

// Meta-session (trash handling) operations.
pub const CM_TRASH_LIST: u32 = 450;
pub const MC_TRASH_LIST: u32 = 451;
pub const CM_DETACHED_LIST: u32 = 452;
pub const MC_DETACHED_LIST: u32 = 453;
pub const CM_DETACHED_ATTR: u32 = 454;
pub const MC_DETACHED_ATTR: u32 = 455;
pub const CM_TRASH_PATH_GET: u32 = 456;
pub const MC_TRASH_PATH_GET: u32 = 457;
pub const CM_TRASH_PATH_SET: u32 = 458;
pub const MC_TRASH_PATH_SET: u32 = 459;
pub const CM_UNDELETE: u32 = 460;
pub const MC_UNDELETE: u32 = 461;
pub const CM_PURGE: u32 = 462;
pub const MC_PURGE: u32 = 463;

/// The reply command the dispatcher must see for a given request command.
pub const fn reply_for(request: u32) -> u32 {
    request + 1
}
