//! Decoder behavior over whole wire captures: fragmentation, interleaved
//! control frames, compression and arbitrary read chunkings.

mod common;

use std::io::{Cursor, Read};

use bytes::{Bytes, BytesMut};
use ws_transport::{Error, FrameDecoder, Session};

use common::*;

const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn new_session() -> Session<Vec<Bytes>> {
    Session::new(Vec::new(), false, 1)
}

/// Feed `wire` to a fresh decoder in one buffer.
fn decode_wire(wire: &[u8]) -> (Vec<Bytes>, Result<(), Error>, Session<Vec<Bytes>>) {
    let session = new_session();
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::from(wire);
    let mut out = Vec::new();
    let res = decoder.decode(&mut Cursor::new(Vec::new()), &mut buf, &session, &mut out);
    (out, res, session)
}

#[test]
fn fragmented_message() {
    let mut wire = client_frame(OP_BINARY, b"first", KEY);
    wire.extend(client_frame(OP_CONTINUATION, b"second", KEY));
    wire.extend(client_frame(FIN | OP_CONTINUATION, b"third", KEY));

    let (out, res, _) = decode_wire(&wire);
    res.unwrap();
    let parts: Vec<&[u8]> = out.iter().map(|b| &b[..]).collect();
    assert_eq!(parts, vec![&b"first"[..], b"second", b"third"]);
}

#[test]
fn control_frame_between_fragments() {
    let mut wire = client_frame(OP_BINARY, b"first", KEY);
    wire.extend(client_frame(FIN | OP_PONG, b"stats", KEY));
    wire.extend(client_frame(FIN | OP_CONTINUATION, b"second", KEY));

    let (out, res, session) = decode_wire(&wire);
    res.unwrap();
    let parts: Vec<&[u8]> = out.iter().map(|b| &b[..]).collect();
    assert_eq!(parts, vec![&b"first"[..], b"second"]);
    assert_eq!(session.with_queue(|q| q.len()), 0, "pong is consumed silently");
}

#[test]
fn ping_between_fragments_answered_without_corrupting_message() {
    let mut wire = client_frame(OP_BINARY, b"first", KEY);
    wire.extend(client_frame(FIN | OP_PING, b"probe", KEY));
    wire.extend(client_frame(FIN | OP_CONTINUATION, b"second", KEY));

    let (out, res, session) = decode_wire(&wire);
    res.unwrap();
    let reassembled: Vec<u8> = out.iter().flat_map(|b| b.iter().copied()).collect();
    assert_eq!(reassembled, b"firstsecond");
    let bufs = session.with_queue(|q| q.clone());
    assert_eq!(bufs[0][0], FIN | OP_PONG);
    assert_eq!(&bufs[1][..], b"probe");
}

#[test]
fn every_chunking_yields_the_same_payloads() {
    let mut wire = client_frame(FIN | OP_BINARY, b"alpha", KEY);
    wire.extend(client_frame(OP_BINARY, b"beta-", KEY));
    wire.extend(client_frame(FIN | OP_CONTINUATION, b"gamma", KEY));
    wire.extend(client_frame(FIN | OP_PING, b"", KEY));
    wire.extend(client_frame(FIN | OP_BINARY, &[0xA5; 300], KEY));

    let reference: Vec<u8> = {
        let (out, res, _) = decode_wire(&wire);
        res.unwrap();
        out.iter().flat_map(|b| b.iter().copied()).collect()
    };

    // Replay the capture through a read loop that pulls `chunk_size` bytes
    // per iteration from the same connection the decoder falls back to for
    // straddling header fields.
    for chunk_size in 1..=wire.len() {
        let session = new_session();
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        let mut conn = Cursor::new(wire.clone());
        loop {
            let mut chunk = vec![0u8; chunk_size];
            let n = conn.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            let mut buf = BytesMut::from(&chunk[..n]);
            decoder
                .decode(&mut conn, &mut buf, &session, &mut out)
                .unwrap_or_else(|e| panic!("chunk size {chunk_size}: {e}"));
        }
        let bytes: Vec<u8> = out.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(bytes, reference, "chunk size {chunk_size}");
    }
}

#[test]
fn boundary_payload_sizes() {
    for size in [0usize, 125, 126, 65535, 65536, 100_000] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        let wire = client_frame(FIN | OP_BINARY, &payload, KEY);
        let (out, res, _) = decode_wire(&wire);
        res.unwrap();
        let bytes: Vec<u8> = out.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(bytes.len(), size, "size {size}");
        assert_eq!(bytes, payload, "size {size}");
    }
}

#[test]
fn compressed_message_single_frame() {
    let plain = b"PUB foo 7\r\nfrom ws\r\n";
    let wire = client_frame(FIN | RSV1 | OP_BINARY, &client_deflate(plain), KEY);
    let (out, res, _) = decode_wire(&wire);
    res.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(&out[0][..], plain);
}

#[test]
fn compressed_message_held_until_final_fragment() {
    let plain = b"a compressed message split across two websocket fragments";
    let deflated = client_deflate(plain);
    let (head, tail) = deflated.split_at(deflated.len() / 2);

    let session = new_session();
    let mut decoder = FrameDecoder::new();
    let mut out = Vec::new();

    let mut buf = BytesMut::from(&client_frame(RSV1 | OP_BINARY, head, KEY)[..]);
    decoder.decode(&mut Cursor::new(Vec::new()), &mut buf, &session, &mut out).unwrap();
    assert!(out.is_empty(), "no delivery before the final fragment");

    let mut buf = BytesMut::from(&client_frame(FIN | OP_CONTINUATION, tail, KEY)[..]);
    decoder.decode(&mut Cursor::new(Vec::new()), &mut buf, &session, &mut out).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(&out[0][..], &plain[..]);
}

#[test]
fn control_frame_between_compressed_fragments() {
    let plain = b"compressed payload with a ping in the middle of its fragments";
    let deflated = client_deflate(plain);
    let (head, tail) = deflated.split_at(deflated.len() / 3);

    let mut wire = client_frame(RSV1 | OP_BINARY, head, KEY);
    wire.extend(client_frame(FIN | OP_PING, b"mid", KEY));
    wire.extend(client_frame(FIN | OP_CONTINUATION, tail, KEY));

    let (out, res, session) = decode_wire(&wire);
    res.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(&out[0][..], &plain[..]);
    let bufs = session.with_queue(|q| q.clone());
    assert_eq!(bufs[0][0], FIN | OP_PONG);
}

#[test]
fn corrupt_compressed_message() {
    let mut deflated = client_deflate(b"some payload worth corrupting for the test");
    for b in deflated.iter_mut() {
        *b = !*b;
    }
    let wire = client_frame(FIN | RSV1 | OP_BINARY, &deflated, KEY);
    let (out, res, _) = decode_wire(&wire);
    assert!(out.is_empty());
    assert!(matches!(res.unwrap_err(), Error::Inflate(_)));
}

#[test]
fn close_after_data_flushes_payloads_first() {
    let mut close_body = 1000u16.to_be_bytes().to_vec();
    close_body.extend_from_slice(b"bye");
    let mut wire = client_frame(FIN | OP_BINARY, b"last words", KEY);
    wire.extend(client_frame(FIN | OP_CLOSE, &close_body, KEY));

    let (out, res, session) = decode_wire(&wire);
    assert!(matches!(res.unwrap_err(), Error::ConnectionClosed));
    assert_eq!(out.len(), 1, "payloads before the close are still delivered");
    assert_eq!(&out[0][..], b"last words");

    let bufs = session.with_queue(|q| q.clone());
    assert_eq!(bufs[0][0], FIN | OP_CLOSE);
    assert_eq!(u16::from_be_bytes([bufs[1][0], bufs[1][1]]), 1000);
    assert_eq!(&bufs[1][2..], b"bye");
}

#[test]
fn oversized_ping_reports_and_enqueues_protocol_error() {
    let wire = client_frame(FIN | OP_PING, &[0x55; 200], KEY);
    let (out, res, session) = decode_wire(&wire);
    assert!(out.is_empty());
    let err = res.unwrap_err();
    assert_eq!(err.to_string(), "control frame length bigger than maximum allowed of 125 bytes");

    let bufs = session.with_queue(|q| q.clone());
    assert_eq!(bufs[0][0], FIN | OP_CLOSE);
    assert_eq!(u16::from_be_bytes([bufs[1][0], bufs[1][1]]), 1002);
    assert_eq!(&bufs[1][2..], err.to_string().as_bytes());
}
