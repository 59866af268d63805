// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Typed metadata operations.
//!
//! Thin wrappers over [`MetaClient::call`]: encode the request payload,
//! check the reply shape, decode. A reply of exactly one byte is a status
//! byte; a reply whose size is impossible for the operation faults the
//! connection the same way a mismatched reply command does.

use bytes::{BufMut, Bytes, BytesMut};
use driftfs_proto::{commands, Attr, Reader, Status, ATTR_LEN};

use crate::client::MetaClient;
use crate::error::OpError;

/// Filesystem usage summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatFs {
    pub total: u64,
    pub available: u64,
    pub trash: u64,
    pub reserved: u64,
    pub inodes: u32,
}

/// Where a chunk of a file lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkLocation {
    pub file_length: u64,
    pub chunk_id: u64,
    pub version: u32,
    /// Storage-node addresses, 6 bytes each (ip u32 + port u16), passed
    /// through to the chunk I/O layer.
    pub locations: Bytes,
}

fn put_name(buf: &mut BytesMut, name: &[u8]) -> Result<(), OpError> {
    let len = u8::try_from(name.len()).map_err(|_| OpError::NameTooLong)?;
    buf.put_u8(len);
    buf.put_slice(name);
    Ok(())
}

impl MetaClient {
    fn bad_reply(&self) -> OpError {
        self.fault_connection();
        OpError::BadReply
    }

    /// Issue a request whose reply is a bare status byte.
    fn status_reply(&self, command: u32, payload: &[u8]) -> Result<(), OpError> {
        let reply = self.call(command, payload)?;
        if reply.payload.len() != 1 {
            return Err(self.bad_reply());
        }
        match Status::from_u8(reply.payload[0]) {
            Status::Ok => Ok(()),
            status => Err(OpError::Status(status)),
        }
    }

    /// Issue a request whose reply carries data. One byte means the server
    /// reported an error instead.
    fn data_reply(&self, command: u32, payload: &[u8]) -> Result<Bytes, OpError> {
        let reply = self.call(command, payload)?;
        if reply.payload.len() == 1 {
            return match Status::from_u8(reply.payload[0]) {
                // A success status where data belongs is as broken as a
                // wrong length.
                Status::Ok => Err(self.bad_reply()),
                status => Err(OpError::Status(status)),
            };
        }
        Ok(reply.payload)
    }

    fn attr_reply(&self, command: u32, payload: &[u8]) -> Result<Attr, OpError> {
        let data = self.data_reply(command, payload)?;
        if data.len() != ATTR_LEN {
            return Err(self.bad_reply());
        }
        let mut attr = [0u8; ATTR_LEN];
        attr.copy_from_slice(&data);
        Ok(attr)
    }

    fn inode_attr_reply(&self, command: u32, payload: &[u8]) -> Result<(u32, Attr), OpError> {
        let data = self.data_reply(command, payload)?;
        if data.len() != 4 + ATTR_LEN {
            return Err(self.bad_reply());
        }
        let mut reader = Reader::new(&data);
        let inode = reader.u32().map_err(|_| OpError::BadReply)?;
        let attr = reader.array::<ATTR_LEN>().map_err(|_| OpError::BadReply)?;
        Ok((inode, attr))
    }

    /// Paths travel as a u32 length (terminator included) followed by the
    /// NUL-terminated bytes.
    fn path_reply(&self, command: u32, payload: &[u8]) -> Result<Bytes, OpError> {
        let data = self.data_reply(command, payload)?;
        if data.len() < 4 {
            return Err(self.bad_reply());
        }
        let mut reader = Reader::new(&data);
        let len = reader.u32().map_err(|_| OpError::BadReply)? as usize;
        if len == 0 || data.len() != 4 + len || data[data.len() - 1] != 0 {
            return Err(self.bad_reply());
        }
        Ok(data.slice(4..4 + len - 1))
    }

    pub fn statfs(&self) -> Result<StatFs, OpError> {
        let data = self.data_reply(commands::CM_STATFS, &[])?;
        if data.len() != 36 {
            return Err(self.bad_reply());
        }
        let mut reader = Reader::new(&data);
        let total = reader.u64().map_err(|_| OpError::BadReply)?;
        let available = reader.u64().map_err(|_| OpError::BadReply)?;
        let trash = reader.u64().map_err(|_| OpError::BadReply)?;
        let reserved = reader.u64().map_err(|_| OpError::BadReply)?;
        let inodes = reader.u32().map_err(|_| OpError::BadReply)?;
        Ok(StatFs {
            total,
            available,
            trash,
            reserved,
            inodes,
        })
    }

    pub fn access(&self, inode: u32, uid: u32, gid: u32, mode_mask: u8) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(13);
        payload.put_u32(inode);
        payload.put_u32(uid);
        payload.put_u32(gid);
        payload.put_u8(mode_mask);
        self.status_reply(commands::CM_ACCESS, &payload)
    }

    pub fn lookup(
        &self,
        parent: u32,
        name: &[u8],
        uid: u32,
        gid: u32,
    ) -> Result<(u32, Attr), OpError> {
        let mut payload = BytesMut::with_capacity(13 + name.len());
        payload.put_u32(parent);
        put_name(&mut payload, name)?;
        payload.put_u32(uid);
        payload.put_u32(gid);
        self.inode_attr_reply(commands::CM_LOOKUP, &payload)
    }

    pub fn getattr(&self, inode: u32, uid: u32, gid: u32) -> Result<Attr, OpError> {
        let mut payload = BytesMut::with_capacity(12);
        payload.put_u32(inode);
        payload.put_u32(uid);
        payload.put_u32(gid);
        self.attr_reply(commands::CM_GETATTR, &payload)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn setattr(
        &self,
        inode: u32,
        uid: u32,
        gid: u32,
        set_mask: u8,
        mode: u16,
        attr_uid: u32,
        attr_gid: u32,
        atime: u32,
        mtime: u32,
    ) -> Result<Attr, OpError> {
        let mut payload = BytesMut::with_capacity(31);
        payload.put_u32(inode);
        payload.put_u32(uid);
        payload.put_u32(gid);
        payload.put_u8(set_mask);
        payload.put_u16(mode);
        payload.put_u32(attr_uid);
        payload.put_u32(attr_gid);
        payload.put_u32(atime);
        payload.put_u32(mtime);
        self.attr_reply(commands::CM_SETATTR, &payload)
    }

    pub fn truncate(
        &self,
        inode: u32,
        opened: bool,
        uid: u32,
        gid: u32,
        length: u64,
    ) -> Result<Attr, OpError> {
        let mut payload = BytesMut::with_capacity(21);
        payload.put_u32(inode);
        payload.put_u8(opened as u8);
        payload.put_u32(uid);
        payload.put_u32(gid);
        payload.put_u64(length);
        self.attr_reply(commands::CM_TRUNCATE, &payload)
    }

    /// Target of a symbolic link, without the trailing NUL.
    pub fn readlink(&self, inode: u32) -> Result<Bytes, OpError> {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(inode);
        self.path_reply(commands::CM_READLINK, &payload)
    }

    pub fn symlink(
        &self,
        parent: u32,
        name: &[u8],
        path: &[u8],
        uid: u32,
        gid: u32,
    ) -> Result<(u32, Attr), OpError> {
        let mut payload = BytesMut::with_capacity(17 + name.len() + path.len() + 1);
        payload.put_u32(parent);
        put_name(&mut payload, name)?;
        payload.put_u32(path.len() as u32 + 1);
        payload.put_slice(path);
        payload.put_u8(0);
        payload.put_u32(uid);
        payload.put_u32(gid);
        self.inode_attr_reply(commands::CM_SYMLINK, &payload)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn mknod(
        &self,
        parent: u32,
        name: &[u8],
        kind: u8,
        mode: u16,
        uid: u32,
        gid: u32,
        rdev: u32,
    ) -> Result<(u32, Attr), OpError> {
        let mut payload = BytesMut::with_capacity(20 + name.len());
        payload.put_u32(parent);
        put_name(&mut payload, name)?;
        payload.put_u8(kind);
        payload.put_u16(mode);
        payload.put_u32(uid);
        payload.put_u32(gid);
        payload.put_u32(rdev);
        self.inode_attr_reply(commands::CM_MKNOD, &payload)
    }

    pub fn mkdir(
        &self,
        parent: u32,
        name: &[u8],
        mode: u16,
        uid: u32,
        gid: u32,
    ) -> Result<(u32, Attr), OpError> {
        let mut payload = BytesMut::with_capacity(15 + name.len());
        payload.put_u32(parent);
        put_name(&mut payload, name)?;
        payload.put_u16(mode);
        payload.put_u32(uid);
        payload.put_u32(gid);
        self.inode_attr_reply(commands::CM_MKDIR, &payload)
    }

    pub fn unlink(&self, parent: u32, name: &[u8], uid: u32, gid: u32) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(13 + name.len());
        payload.put_u32(parent);
        put_name(&mut payload, name)?;
        payload.put_u32(uid);
        payload.put_u32(gid);
        self.status_reply(commands::CM_UNLINK, &payload)
    }

    pub fn rmdir(&self, parent: u32, name: &[u8], uid: u32, gid: u32) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(13 + name.len());
        payload.put_u32(parent);
        put_name(&mut payload, name)?;
        payload.put_u32(uid);
        payload.put_u32(gid);
        self.status_reply(commands::CM_RMDIR, &payload)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn rename(
        &self,
        src_parent: u32,
        src_name: &[u8],
        dst_parent: u32,
        dst_name: &[u8],
        uid: u32,
        gid: u32,
    ) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(18 + src_name.len() + dst_name.len());
        payload.put_u32(src_parent);
        put_name(&mut payload, src_name)?;
        payload.put_u32(dst_parent);
        put_name(&mut payload, dst_name)?;
        payload.put_u32(uid);
        payload.put_u32(gid);
        self.status_reply(commands::CM_RENAME, &payload)
    }

    pub fn link(
        &self,
        inode: u32,
        dst_parent: u32,
        dst_name: &[u8],
        uid: u32,
        gid: u32,
    ) -> Result<(u32, Attr), OpError> {
        let mut payload = BytesMut::with_capacity(17 + dst_name.len());
        payload.put_u32(inode);
        payload.put_u32(dst_parent);
        put_name(&mut payload, dst_name)?;
        payload.put_u32(uid);
        payload.put_u32(gid);
        self.inode_attr_reply(commands::CM_LINK, &payload)
    }

    /// Raw directory listing blob; the filesystem layer decodes entries.
    pub fn readdir(
        &self,
        inode: u32,
        uid: u32,
        gid: u32,
        with_attrs: bool,
    ) -> Result<Bytes, OpError> {
        let mut payload = BytesMut::with_capacity(13);
        payload.put_u32(inode);
        payload.put_u32(uid);
        payload.put_u32(gid);
        if with_attrs {
            payload.put_u8(1);
        }
        self.data_reply(commands::CM_READDIR, &payload)
    }

    /// Ask the server whether this open is allowed, tracking the inode as
    /// held for the duration. The reference is dropped again if the server
    /// refuses.
    pub fn open(&self, inode: u32, uid: u32, gid: u32, flags: u8) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(13);
        payload.put_u32(inode);
        payload.put_u32(uid);
        payload.put_u32(gid);
        payload.put_u8(flags);
        self.notify_open(inode);
        let result = self.status_reply(commands::CM_OPEN, &payload);
        if result.is_err() {
            self.notify_close(inode);
        }
        result
    }

    /// Drop one open reference. Purely local; the server learns through
    /// the periodic reserved-inode report.
    pub fn release(&self, inode: u32) {
        self.notify_close(inode);
    }

    pub fn read_chunk(&self, inode: u32, index: u32) -> Result<ChunkLocation, OpError> {
        self.chunk_location(commands::CM_READ_CHUNK, inode, index)
    }

    pub fn write_chunk(&self, inode: u32, index: u32) -> Result<ChunkLocation, OpError> {
        self.chunk_location(commands::CM_WRITE_CHUNK, inode, index)
    }

    fn chunk_location(
        &self,
        command: u32,
        inode: u32,
        index: u32,
    ) -> Result<ChunkLocation, OpError> {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u32(inode);
        payload.put_u32(index);
        let data = self.data_reply(command, &payload)?;
        if data.len() < 20 || (data.len() - 20) % 6 != 0 {
            return Err(self.bad_reply());
        }
        let mut reader = Reader::new(&data);
        let file_length = reader.u64().map_err(|_| OpError::BadReply)?;
        let chunk_id = reader.u64().map_err(|_| OpError::BadReply)?;
        let version = reader.u32().map_err(|_| OpError::BadReply)?;
        Ok(ChunkLocation {
            file_length,
            chunk_id,
            version,
            locations: data.slice(20..),
        })
    }

    pub fn write_end(&self, chunk_id: u64, inode: u32, length: u64) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(20);
        payload.put_u64(chunk_id);
        payload.put_u32(inode);
        payload.put_u64(length);
        self.status_reply(commands::CM_WRITE_END, &payload)
    }

    // Meta-session operations (trash handling).

    pub fn trash_list(&self) -> Result<Bytes, OpError> {
        self.data_reply(commands::CM_TRASH_LIST, &[])
    }

    pub fn detached_list(&self) -> Result<Bytes, OpError> {
        self.data_reply(commands::CM_DETACHED_LIST, &[])
    }

    pub fn detached_attr(&self, inode: u32) -> Result<Attr, OpError> {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(inode);
        self.attr_reply(commands::CM_DETACHED_ATTR, &payload)
    }

    /// Original path of a trashed inode, without the trailing NUL.
    pub fn trash_path(&self, inode: u32) -> Result<Bytes, OpError> {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(inode);
        self.path_reply(commands::CM_TRASH_PATH_GET, &payload)
    }

    pub fn set_trash_path(&self, inode: u32, path: &[u8]) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(8 + path.len() + 1);
        payload.put_u32(inode);
        payload.put_u32(path.len() as u32 + 1);
        payload.put_slice(path);
        payload.put_u8(0);
        self.status_reply(commands::CM_TRASH_PATH_SET, &payload)
    }

    pub fn undelete(&self, inode: u32) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(inode);
        self.status_reply(commands::CM_UNDELETE, &payload)
    }

    pub fn purge(&self, inode: u32) -> Result<(), OpError> {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(inode);
        self.status_reply(commands::CM_PURGE, &payload)
    }
}
