//! Outbound frame construction.

pub mod coding;
pub(crate) mod fetch;
pub(crate) mod mask;

use std::borrow::Cow;

use crate::deflate;
use crate::error::Result;

use self::coding::{OpCode, FIN_BIT, MAX_CONTROL_PAYLOAD, RSV1_BIT};

/// Build a frame header for a single-frame server message.
///
/// Byte 0 carries the opcode, the final bit (servers emit whole messages)
/// and, for the first frame of a compressed message, RSV1. The payload
/// length is encoded in 1, 1+2 or 1+8 bytes depending on magnitude. Servers
/// never mask, so the mask bit stays clear.
pub fn frame_header(compressed: bool, opcode: OpCode, len: usize) -> Vec<u8> {
    let mut b = opcode as u8 | FIN_BIT;
    if compressed {
        b |= RSV1_BIT;
    }
    match len {
        0..=125 => vec![b, len as u8],
        126..=65535 => {
            let mut fh = vec![b, 126];
            fh.extend_from_slice(&(len as u16).to_be_bytes());
            fh
        }
        _ => {
            let mut fh = vec![b, 127];
            fh.extend_from_slice(&(len as u64).to_be_bytes());
            fh
        }
    }
}

/// Build the header and on-wire payload for an outbound frame, compressing
/// data frames when requested.
///
/// Control frames are never compressed, whatever the caller asked for. A
/// compressed payload has its trailing 4-byte sync marker stripped; the peer
/// re-appends it under `no_context_takeover` (RFC 7692, section 7.2.1).
pub fn create_frame_and_payload(
    opcode: OpCode,
    compress: bool,
    level: i32,
    payload: &[u8],
) -> Result<(Vec<u8>, Cow<'_, [u8]>)> {
    let compress = compress && !opcode.is_control();
    if compress {
        let deflated = deflate::compress(level, payload)?;
        let header = frame_header(true, opcode, deflated.len());
        Ok((header, Cow::Owned(deflated)))
    } else {
        Ok((frame_header(false, opcode, payload.len()), Cow::Borrowed(payload)))
    }
}

/// Build a Close frame payload: two big-endian status bytes followed by a
/// UTF-8 body. A body that would overflow the control-frame payload limit is
/// truncated and suffixed with `"..."` as a hint that it is incomplete.
pub fn create_close_message(status: u16, body: &str) -> Vec<u8> {
    let mut body = body.as_bytes();
    let mut truncated = false;
    if body.len() > MAX_CONTROL_PAYLOAD {
        body = &body[..MAX_CONTROL_PAYLOAD - 3];
        truncated = true;
    }
    let mut buf = Vec::with_capacity(2 + MAX_CONTROL_PAYLOAD.min(body.len() + 3));
    buf.extend_from_slice(&status.to_be_bytes());
    buf.extend_from_slice(body);
    if truncated {
        buf.extend_from_slice(b"...");
    }
    buf
}
