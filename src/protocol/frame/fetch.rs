//! Exact-count reads that prefer the connection's read buffer.

use std::io::{self, Read};

use bytes::BytesMut;

/// Return exactly `needed` bytes, drawn from the front of `buf` when
/// possible and otherwise completed with blocking reads from `stream`.
///
/// When `buf` holds enough, this is a zero-copy `split_to` of the shared
/// buffer. Otherwise the available tail of `buf` is drained into a fresh
/// holder and the remainder is read from the stream, so a frame header field
/// straddling the end of a read buffer is still decoded in one piece.
pub(crate) fn fetch_exact(
    stream: &mut impl Read,
    buf: &mut BytesMut,
    needed: usize,
) -> io::Result<BytesMut> {
    if buf.len() >= needed {
        return Ok(buf.split_to(needed));
    }
    let mut holder = BytesMut::with_capacity(needed);
    holder.extend_from_slice(&buf.split_to(buf.len()));
    let mut start = holder.len();
    holder.resize(needed, 0);
    while start != needed {
        let n = stream.read(&mut holder[start..])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed while reading frame",
            ));
        }
        start += n;
    }
    Ok(holder)
}
