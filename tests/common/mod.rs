//! Client-side helpers shared by the integration tests: building masked
//! frames and speaking the compressed wire format from the peer's side.
#![allow(dead_code)]

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

pub const FIN: u8 = 0x80;
pub const RSV1: u8 = 0x40;
pub const OP_BINARY: u8 = 2;
pub const OP_CONTINUATION: u8 = 0;
pub const OP_PING: u8 = 9;
pub const OP_PONG: u8 = 10;
pub const OP_CLOSE: u8 = 8;

/// Build a client-to-server frame: header, extended length, mask key and
/// masked payload.
pub fn client_frame(b0: u8, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    let mut frame = vec![b0];
    match payload.len() {
        0..=125 => frame.push(0x80 | payload.len() as u8),
        126..=65535 => {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        _ => {
            frame.push(0x80 | 127);
            frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        }
    }
    frame.extend_from_slice(&key);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i & 3]));
    frame
}

/// Compress a payload the way a `permessage-deflate` client does: sync
/// flush, then strip the 4-byte sync marker.
pub fn client_deflate(payload: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(payload).unwrap();
    enc.flush().unwrap();
    let mut out = enc.get_ref().clone();
    out.truncate(out.len() - 4);
    out
}

/// Inflate a server frame's payload whose sync marker was stripped on the
/// wire.
pub fn client_inflate(wire: &[u8]) -> Vec<u8> {
    let mut input = wire.to_vec();
    // Sync marker plus a final empty block so the decoder sees a clean end
    // of stream.
    input.extend_from_slice(&[0x00, 0x00, 0xff, 0xff, 0x01, 0x00, 0x00, 0xff, 0xff]);
    let mut out = Vec::new();
    DeflateDecoder::new(&input[..]).read_to_end(&mut out).unwrap();
    out
}
