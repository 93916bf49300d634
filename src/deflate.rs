//! Pooled `permessage-deflate` compressors and decompressors.
//!
//! Both sides negotiate `no_context_takeover`, so no deflate history is
//! carried between messages and the expensive zlib objects can be reused
//! across frames and connections. Compressors are keyed by level; the
//! decompressor pool is unkeyed.

use std::io::Write;
use std::sync::OnceLock;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Lowest accepted broker compression level.
pub const MIN_COMPRESSION_LEVEL: i32 = -2;
/// Highest accepted broker compression level.
pub const MAX_COMPRESSION_LEVEL: i32 = 9;
/// Default broker compression level (favors speed).
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 1;

/// RFC 7692 sync marker stripped from compressed frames.
const SYNC_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Sync marker plus a final empty block, re-appended before inflating so a
/// streaming inflater does not report an unexpected EOF
/// (RFC 7692, section 7.2.2).
const INFLATE_TAIL: [u8; 9] = [0x00, 0x00, 0xff, 0xff, 0x01, 0x00, 0x00, 0xff, 0xff];

/// Free-list soft capacity; releases beyond it drop the object instead.
const POOL_SOFT_CAP: usize = 16;

/// Output growth step while inflating.
const INFLATE_CHUNK: usize = 16 * 1024;

struct Pools {
    /// One free-list per compression level in
    /// [`MIN_COMPRESSION_LEVEL`, `MAX_COMPRESSION_LEVEL`].
    compressors: Vec<Mutex<Vec<DeflateEncoder<Vec<u8>>>>>,
    decompressors: Mutex<Vec<Decompress>>,
}

fn pools() -> &'static Pools {
    static POOLS: OnceLock<Pools> = OnceLock::new();
    POOLS.get_or_init(|| {
        let levels = (MAX_COMPRESSION_LEVEL - MIN_COMPRESSION_LEVEL + 1) as usize;
        Pools {
            compressors: (0..levels).map(|_| Mutex::new(Vec::new())).collect(),
            decompressors: Mutex::new(Vec::new()),
        }
    })
}

/// Map a broker level onto flate2. The broker's negative levels have no
/// direct flate2 counterpart: -1 (library default) becomes flate2's default
/// and -2 (Huffman-only) the fastest setting.
fn flate2_level(level: i32) -> Compression {
    match level {
        i32::MIN..=-2 => Compression::fast(),
        -1 => Compression::default(),
        _ => Compression::new(level.clamp(0, MAX_COMPRESSION_LEVEL) as u32),
    }
}

fn pool_index(level: i32) -> usize {
    (level.clamp(MIN_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL) - MIN_COMPRESSION_LEVEL) as usize
}

/// Deflate `payload` at `level` and strip the trailing sync marker.
pub(crate) fn compress(level: i32, payload: &[u8]) -> Result<Vec<u8>> {
    let mut enc = match pools().compressors[pool_index(level)].lock().pop() {
        // Reset on acquire: point the recycled encoder at a fresh sink and
        // discard whatever stale output it still held.
        Some(mut enc) => {
            enc.reset(Vec::with_capacity(payload.len()))?;
            enc
        }
        None => DeflateEncoder::new(Vec::with_capacity(payload.len()), flate2_level(level)),
    };
    enc.write_all(payload)?;
    enc.flush()?;
    let written = enc.get_ref();
    debug_assert!(written.len() >= 4 && written[written.len() - 4..] == SYNC_TRAILER);
    let out = written[..written.len() - 4].to_vec();
    release_compressor(level, enc);
    Ok(out)
}

fn release_compressor(level: i32, enc: DeflateEncoder<Vec<u8>>) {
    let mut pool = pools().compressors[pool_index(level)].lock();
    if pool.len() < POOL_SOFT_CAP {
        pool.push(enc);
    }
}

/// Inflate one complete message accumulated by the decoder. The stripped
/// wire trailer is re-appended internally.
pub(crate) fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut dec = match pools().decompressors.lock().pop() {
        Some(mut dec) => {
            dec.reset(false);
            dec
        }
        None => Decompress::new(false),
    };
    let mut out = Vec::with_capacity((compressed.len() * 2).max(64));
    let result = inflate_chunk(&mut dec, compressed, &mut out)
        .and_then(|_| inflate_chunk(&mut dec, &INFLATE_TAIL, &mut out));
    let mut pool = pools().decompressors.lock();
    if pool.len() < POOL_SOFT_CAP {
        pool.push(dec);
    }
    drop(pool);
    result.map(|_| out)
}

fn inflate_chunk(dec: &mut Decompress, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
    while !input.is_empty() {
        if out.len() == out.capacity() {
            out.reserve(INFLATE_CHUNK);
        }
        let before_in = dec.total_in();
        let before_out = dec.total_out();
        let status = dec
            .decompress_vec(input, out, FlushDecompress::None)
            .map_err(|e| Error::Inflate(e.to_string()))?;
        let consumed = (dec.total_in() - before_in) as usize;
        input = &input[consumed..];
        match status {
            Status::StreamEnd => break,
            Status::Ok => {}
            Status::BufError => {
                if consumed == 0 && dec.total_out() == before_out && out.len() < out.capacity() {
                    // The inflater wants input we do not have yet; the rest
                    // of the message arrives with the tail marker.
                    break;
                }
            }
        }
    }
    Ok(())
}
