// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session registration payloads.
//!
//! Registration frames use the common header with correlation id 0. The
//! payload always starts with the fixed capability blob, the registration
//! kind and the client version; the remainder depends on the kind.

use bytes::{BufMut, BytesMut};
use md5::{Digest, Md5};

use crate::commands;
use crate::frame;
use crate::status::Status;
use crate::wire::{Reader, WireError};

/// Fixed capability blob opening every registration payload. The server
/// refuses clients presenting anything else.
pub const CAPABILITY_BLOB: &[u8; 64] =
    b"DRIFTFS MOUNT CLIENT CAPABILITY 1.0 : kNm4xPzR7qWv2LtJc8HgY3bDfS";

/// Client version advertised during registration.
pub const VERSION_MAJOR: u16 = 0;
pub const VERSION_MID: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

/// Registration kinds.
pub const KIND_CHALLENGE: u8 = 1;
pub const KIND_NEW_SESSION: u8 = 2;
pub const KIND_NEW_META_SESSION: u8 = 3;
pub const KIND_RECONNECT: u8 = 4;

/// Size of the entropy block returned for [`KIND_CHALLENGE`].
pub const CHALLENGE_LEN: usize = 32;

/// Size of the password proof presented with new-session kinds.
pub const PROOF_LEN: usize = 16;

const FIXED_PREFIX_LEN: usize = CAPABILITY_BLOB.len() + 1 + 4;

/// A registration request as sent by the mount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterRequest<'a> {
    /// Ask the server for challenge entropy before presenting a proof.
    Challenge,
    /// Open a fresh filesystem session.
    NewSession {
        info: &'a str,
        subfolder: &'a str,
        proof: Option<[u8; PROOF_LEN]>,
    },
    /// Open a fresh meta (trash-handling) session.
    NewMetaSession {
        info: &'a str,
        proof: Option<[u8; PROOF_LEN]>,
    },
    /// Resume an existing session after a transport fault.
    Reconnect { session_id: u32 },
}

impl RegisterRequest<'_> {
    fn kind(&self) -> u8 {
        match self {
            RegisterRequest::Challenge => KIND_CHALLENGE,
            RegisterRequest::NewSession { .. } => KIND_NEW_SESSION,
            RegisterRequest::NewMetaSession { .. } => KIND_NEW_META_SESSION,
            RegisterRequest::Reconnect { .. } => KIND_RECONNECT,
        }
    }

    fn payload_len(&self) -> usize {
        FIXED_PREFIX_LEN
            + match self {
                RegisterRequest::Challenge => 0,
                RegisterRequest::NewSession {
                    info,
                    subfolder,
                    proof,
                } => 4 + info.len() + 4 + subfolder.len() + proof.map_or(0, |_| PROOF_LEN),
                RegisterRequest::NewMetaSession { info, proof } => {
                    4 + info.len() + proof.map_or(0, |_| PROOF_LEN)
                }
                RegisterRequest::Reconnect { .. } => 4,
            }
    }

    /// Append the complete registration frame (header included).
    pub fn encode(&self, buf: &mut BytesMut) {
        frame::put_header(buf, commands::CM_REGISTER, 0, self.payload_len());
        buf.put_slice(CAPABILITY_BLOB);
        buf.put_u8(self.kind());
        buf.put_u16(VERSION_MAJOR);
        buf.put_u8(VERSION_MID);
        buf.put_u8(VERSION_MINOR);
        match self {
            RegisterRequest::Challenge => {}
            RegisterRequest::NewSession {
                info,
                subfolder,
                proof,
            } => {
                buf.put_u32(info.len() as u32);
                buf.put_slice(info.as_bytes());
                buf.put_u32(subfolder.len() as u32);
                buf.put_slice(subfolder.as_bytes());
                if let Some(proof) = proof {
                    buf.put_slice(proof);
                }
            }
            RegisterRequest::NewMetaSession { info, proof } => {
                buf.put_u32(info.len() as u32);
                buf.put_slice(info.as_bytes());
                if let Some(proof) = proof {
                    buf.put_slice(proof);
                }
            }
            RegisterRequest::Reconnect { session_id } => {
                buf.put_u32(*session_id);
            }
        }
    }
}

/// A registration request as parsed by the server side (and test fixtures).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedRegister {
    pub kind: u8,
    pub version: (u16, u8, u8),
    pub info: Option<Vec<u8>>,
    pub subfolder: Option<Vec<u8>>,
    pub proof: Option<[u8; PROOF_LEN]>,
    pub session_id: Option<u32>,
}

/// Parse a registration request payload.
pub fn parse_register_request(payload: &[u8]) -> Result<ParsedRegister, WireError> {
    let mut reader = Reader::new(payload);
    let blob = reader.bytes(CAPABILITY_BLOB.len())?;
    if blob != CAPABILITY_BLOB {
        return Err(WireError::Malformed("capability blob mismatch"));
    }
    let kind = reader.u8()?;
    let version = (reader.u16()?, reader.u8()?, reader.u8()?);
    let mut parsed = ParsedRegister {
        kind,
        version,
        info: None,
        subfolder: None,
        proof: None,
        session_id: None,
    };
    match kind {
        KIND_CHALLENGE => {}
        KIND_NEW_SESSION | KIND_NEW_META_SESSION => {
            let info_len = reader.u32()? as usize;
            parsed.info = Some(reader.bytes(info_len)?.to_vec());
            if kind == KIND_NEW_SESSION {
                let subfolder_len = reader.u32()? as usize;
                parsed.subfolder = Some(reader.bytes(subfolder_len)?.to_vec());
            }
            if reader.remaining() == PROOF_LEN {
                parsed.proof = Some(reader.array::<PROOF_LEN>()?);
            }
        }
        KIND_RECONNECT => {
            parsed.session_id = Some(reader.u32()?);
        }
        _ => return Err(WireError::Malformed("unknown registration kind")),
    }
    reader.finish()?;
    Ok(parsed)
}

/// What the server granted during a new-session registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: u32,
    pub flags: u8,
    /// Root uid/gid for filesystem sessions; absent for meta sessions.
    pub root: Option<(u32, u32)>,
    /// Remapped uid/gid when the export maps all users.
    pub remap: Option<(u32, u32)>,
}

/// Parsed registration reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A session was granted (new-session kinds).
    Granted(SessionGrant),
    /// Bare success acknowledgement (reconnect kind).
    Ack,
    /// The server refused the registration.
    Rejected(Status),
}

/// Parse a [`commands::MC_REGISTER`] reply payload. Shape checks beyond
/// the length (meta vs. filesystem session) are the caller's.
pub fn parse_register_reply(payload: &[u8]) -> Result<RegisterOutcome, WireError> {
    match payload.len() {
        1 => {
            let status = Status::from_u8(payload[0]);
            if status.is_ok() {
                Ok(RegisterOutcome::Ack)
            } else {
                Ok(RegisterOutcome::Rejected(status))
            }
        }
        5 | 13 | 21 => {
            let mut reader = Reader::new(payload);
            let session_id = reader.u32()?;
            let flags = reader.u8()?;
            let root = if payload.len() >= 13 {
                Some((reader.u32()?, reader.u32()?))
            } else {
                None
            };
            let remap = if payload.len() == 21 {
                Some((reader.u32()?, reader.u32()?))
            } else {
                None
            };
            reader.finish()?;
            Ok(RegisterOutcome::Granted(SessionGrant {
                session_id,
                flags,
                root,
                remap,
            }))
        }
        _ => Err(WireError::Malformed("registration reply length")),
    }
}

/// Parse a [`KIND_CHALLENGE`] reply payload.
pub fn parse_challenge(payload: &[u8]) -> Result<[u8; CHALLENGE_LEN], WireError> {
    let mut reader = Reader::new(payload);
    let challenge = reader.array::<CHALLENGE_LEN>()?;
    reader.finish()?;
    Ok(challenge)
}

/// The secret digest a mount holds instead of the password itself.
pub fn secret_digest(password: &[u8]) -> [u8; PROOF_LEN] {
    Md5::digest(password).into()
}

/// The proof presented during registration: the server entropy sandwiches
/// the secret digest, so neither half alone replays.
pub fn password_proof(
    challenge: &[u8; CHALLENGE_LEN],
    secret: &[u8; PROOF_LEN],
) -> [u8; PROOF_LEN] {
    let mut hasher = Md5::new();
    hasher.update(&challenge[..16]);
    hasher.update(secret);
    hasher.update(&challenge[16..]);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_payload(request: &RegisterRequest<'_>) -> Vec<u8> {
        let mut buf = BytesMut::new();
        request.encode(&mut buf);
        buf[crate::frame::HEADER_LEN..].to_vec()
    }

    #[test]
    fn new_session_round_trip() {
        let proof = [7u8; PROOF_LEN];
        let request = RegisterRequest::NewSession {
            info: "host:/mnt/drift",
            subfolder: "/projects",
            proof: Some(proof),
        };
        let parsed = parse_register_request(&encode_payload(&request)).unwrap();
        assert_eq!(parsed.kind, KIND_NEW_SESSION);
        assert_eq!(parsed.version, (VERSION_MAJOR, VERSION_MID, VERSION_MINOR));
        assert_eq!(parsed.info.as_deref(), Some(b"host:/mnt/drift".as_ref()));
        assert_eq!(parsed.subfolder.as_deref(), Some(b"/projects".as_ref()));
        assert_eq!(parsed.proof, Some(proof));
        assert_eq!(parsed.session_id, None);
    }

    #[test]
    fn meta_session_has_no_subfolder() {
        let request = RegisterRequest::NewMetaSession {
            info: "host:meta",
            proof: None,
        };
        let parsed = parse_register_request(&encode_payload(&request)).unwrap();
        assert_eq!(parsed.kind, KIND_NEW_META_SESSION);
        assert_eq!(parsed.subfolder, None);
        assert_eq!(parsed.proof, None);
    }

    #[test]
    fn reconnect_carries_session_id() {
        let request = RegisterRequest::Reconnect { session_id: 0xdead };
        let parsed = parse_register_request(&encode_payload(&request)).unwrap();
        assert_eq!(parsed.kind, KIND_RECONNECT);
        assert_eq!(parsed.session_id, Some(0xdead));
    }

    #[test]
    fn foreign_capability_blob_is_refused() {
        let mut payload = encode_payload(&RegisterRequest::Challenge);
        payload[0] ^= 0xff;
        assert_eq!(
            parse_register_request(&payload),
            Err(WireError::Malformed("capability blob mismatch"))
        );
    }

    #[test]
    fn reply_shapes() {
        assert_eq!(parse_register_reply(&[0]).unwrap(), RegisterOutcome::Ack);
        assert_eq!(
            parse_register_reply(&[9]).unwrap(),
            RegisterOutcome::Rejected(Status::BadCredentials)
        );

        let mut meta = Vec::new();
        meta.extend_from_slice(&77u32.to_be_bytes());
        meta.push(0b10);
        match parse_register_reply(&meta).unwrap() {
            RegisterOutcome::Granted(grant) => {
                assert_eq!(grant.session_id, 77);
                assert_eq!(grant.flags, 0b10);
                assert_eq!(grant.root, None);
                assert_eq!(grant.remap, None);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let mut full = meta.clone();
        full.extend_from_slice(&0u32.to_be_bytes());
        full.extend_from_slice(&0u32.to_be_bytes());
        full.extend_from_slice(&1000u32.to_be_bytes());
        full.extend_from_slice(&1000u32.to_be_bytes());
        match parse_register_reply(&full).unwrap() {
            RegisterOutcome::Granted(grant) => {
                assert_eq!(grant.root, Some((0, 0)));
                assert_eq!(grant.remap, Some((1000, 1000)));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert!(parse_register_reply(&[0; 7]).is_err());
    }

    #[test]
    fn proof_depends_on_challenge_half_order() {
        let secret = secret_digest(b"hunter2");
        let mut challenge = [0u8; CHALLENGE_LEN];
        for (i, byte) in challenge.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let mut swapped = [0u8; CHALLENGE_LEN];
        swapped[..16].copy_from_slice(&challenge[16..]);
        swapped[16..].copy_from_slice(&challenge[..16]);

        assert_ne!(
            password_proof(&challenge, &secret),
            password_proof(&swapped, &secret)
        );
    }
}
