//! Inbound frame decoding.

pub mod frame;

use std::io::Read;
use std::str;

use bytes::{Buf, Bytes, BytesMut};
use log::trace;

use crate::deflate;
use crate::error::{Error, Result};
use crate::session::{OutboundQueue, Session};

use self::frame::coding::{
    CloseStatus, OpCode, FIN_BIT, MASK_BIT, MAX_CONTROL_PAYLOAD, RSV1_BIT,
};
use self::frame::create_close_message;
use self::frame::fetch::fetch_exact;
use self::frame::mask::MaskState;

/// Resumable decoder for one connection's inbound frame stream.
///
/// The decoder is a plain value owned by the connection's read task. Each
/// call to [`decode`](FrameDecoder::decode) consumes one read buffer and can
/// stop at any byte boundary: a frame header, a masking key or a payload may
/// all straddle the end of a buffer and resume in the next call. Control
/// frames are answered through the [`Session`] as they are parsed, without
/// disturbing an in-flight fragmented message.
#[derive(Debug)]
pub struct FrameDecoder {
    /// True when the next byte starts a new frame header.
    awaiting_header: bool,
    /// True when the next data frame must open a message (i.e. must not be
    /// a continuation). Doubles as the "message complete" marker once the
    /// final fragment's header has been parsed.
    first_fragment: bool,
    /// Whether the in-flight message is compressed. Carried from the first
    /// fragment through its continuations.
    compressed: bool,
    /// Payload bytes of the current frame not yet consumed.
    remaining: usize,
    mask: MaskState,
    /// Accumulates a compressed message across fragments until the final
    /// fragment arrives and the whole message can be inflated.
    pending: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder::new()
    }
}

impl FrameDecoder {
    /// Decoder in its initial state, expecting a frame header.
    pub fn new() -> FrameDecoder {
        FrameDecoder {
            awaiting_header: true,
            first_fragment: true,
            compressed: false,
            remaining: 0,
            mask: MaskState::default(),
            pending: BytesMut::new(),
        }
    }

    /// Decode every frame in `buf`, pushing message payloads into `out` in
    /// wire order.
    ///
    /// `buf` is one read's worth of bytes; it is fully consumed on success.
    /// Header fields that run off its end are completed with blocking reads
    /// from `stream`. Control frames are handled inline: Ping enqueues a
    /// Pong on `session`, Pong is ignored, and Close enqueues the
    /// reciprocal Close and returns [`Error::ConnectionClosed`]. Payloads
    /// decoded before an error are already in `out` when it returns, so the
    /// caller can still deliver them upstream.
    pub fn decode<Q: OutboundQueue>(
        &mut self,
        stream: &mut impl Read,
        buf: &mut BytesMut,
        session: &Session<Q>,
        out: &mut Vec<Bytes>,
    ) -> Result<()> {
        while !buf.is_empty() {
            if self.awaiting_header {
                let b0 = buf[0];
                buf.advance(1);
                let fin = b0 & FIN_BIT != 0;
                let compressed = b0 & RSV1_BIT != 0;
                let raw_opcode = b0 & 0x0F;

                let b1 = fetch_exact(stream, buf, 1)?[0];
                // Clients must set the mask bit; reject outright if absent.
                if b1 & MASK_BIT == 0 {
                    return Err(session.handle_protocol_error("mask bit missing".into()));
                }
                self.remaining = (b1 & 0x7F) as usize;

                let opcode = match OpCode::from_u8(raw_opcode) {
                    Some(opcode) => opcode,
                    None => {
                        return Err(session
                            .handle_protocol_error(format!("unknown opcode {raw_opcode}").into()))
                    }
                };
                match opcode {
                    OpCode::Ping | OpCode::Pong | OpCode::Close => {
                        if self.remaining > MAX_CONTROL_PAYLOAD {
                            return Err(session.handle_protocol_error(
                                format!(
                                    "control frame length bigger than maximum allowed of \
                                     {MAX_CONTROL_PAYLOAD} bytes"
                                )
                                .into(),
                            ));
                        }
                        if !fin {
                            return Err(session.handle_protocol_error(
                                "control frame does not have final bit set".into(),
                            ));
                        }
                    }
                    OpCode::Text | OpCode::Binary => {
                        if !self.first_fragment {
                            return Err(session.handle_protocol_error(
                                "new message started before final frame for previous message \
                                 was received"
                                    .into(),
                            ));
                        }
                        self.first_fragment = fin;
                        self.compressed = compressed;
                    }
                    OpCode::Continuation => {
                        // RSV1 belongs on the first frame of a message only.
                        if self.first_fragment || compressed {
                            return Err(session
                                .handle_protocol_error("invalid continuation frame".into()));
                        }
                        self.first_fragment = fin;
                    }
                }

                match self.remaining {
                    126 => {
                        let ext = fetch_exact(stream, buf, 2)?;
                        self.remaining = u16::from_be_bytes([ext[0], ext[1]]) as usize;
                    }
                    127 => {
                        let ext = fetch_exact(stream, buf, 8)?;
                        let mut be = [0u8; 8];
                        be.copy_from_slice(&ext[..8]);
                        self.remaining = u64::from_be_bytes(be) as usize;
                    }
                    _ => {}
                }

                let key = fetch_exact(stream, buf, 4)?;
                self.mask.reset([key[0], key[1], key[2], key[3]]);

                if opcode.is_control() {
                    // Handled in place; an interleaved control frame leaves
                    // the fragment state of a data message untouched.
                    self.handle_control_frame(opcode, stream, buf, session)?;
                    continue;
                }
                trace!(
                    "frame opcode={opcode} fin={fin} compressed={compressed} len={}",
                    self.remaining
                );
                self.awaiting_header = false;
                if buf.is_empty() {
                    break;
                }
            }

            let n = self.remaining.min(buf.len());
            let mut chunk = buf.split_to(n);
            self.remaining -= n;
            self.mask.unmask(&mut chunk);
            if self.compressed {
                // No partial delivery for compressed messages: bytes pile up
                // until the final fragment and inflate as one unit.
                self.pending.extend_from_slice(&chunk);
                if self.remaining == 0 && self.first_fragment {
                    let plain = deflate::decompress(&self.pending)?;
                    out.push(Bytes::from(plain));
                }
            } else {
                // The upstream line parser tolerates partial payloads, so a
                // frame split across read buffers is delivered as it comes.
                out.push(chunk.freeze());
            }
            if self.remaining == 0 {
                self.awaiting_header = true;
                if self.first_fragment {
                    self.compressed = false;
                    self.pending.clear();
                }
            }
        }
        Ok(())
    }

    /// Handle Ping, Pong and Close. The payload, if any, is fetched and
    /// unmasked here; `remaining` is zero on return.
    fn handle_control_frame<Q: OutboundQueue>(
        &mut self,
        opcode: OpCode,
        stream: &mut impl Read,
        buf: &mut BytesMut,
        session: &Session<Q>,
    ) -> Result<()> {
        let mut payload = BytesMut::new();
        if self.remaining > 0 {
            payload = fetch_exact(stream, buf, self.remaining)?;
            self.mask.unmask(&mut payload);
            self.remaining = 0;
        }
        match opcode {
            OpCode::Close => {
                let mut status: u16 = CloseStatus::NoStatusReceived.into();
                let mut body = String::new();
                // A non-empty Close payload opens with two status bytes and
                // may carry a UTF-8 reason (RFC 6455, section 5.5.1).
                if payload.len() >= 2 {
                    status = u16::from_be_bytes([payload[0], payload[1]]);
                    match str::from_utf8(&payload[2..]) {
                        Ok(text) => body = text.to_owned(),
                        Err(_) => {
                            status = CloseStatus::InvalidPayload.into();
                            body = "invalid utf8 body in close frame".to_owned();
                        }
                    }
                }
                session.enqueue_control(OpCode::Close, &create_close_message(status, &body));
                // The read loop delivers already-decoded payloads upstream,
                // then tears the connection down.
                Err(Error::ConnectionClosed)
            }
            OpCode::Ping => {
                session.enqueue_control(OpCode::Pong, &payload);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
