//! Per-connection write-side state shared between the broker and the
//! frame decoder.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::Error;
use crate::protocol::frame::coding::{CloseStatus, OpCode};
use crate::protocol::frame::{create_close_message, create_frame_and_payload, frame_header};
use crate::Result;

/// The broker's per-client outbound queue, as seen by the transport.
///
/// The transport only ever appends framed bytes; draining the queue onto the
/// socket (and the associated write deadlines and slow-consumer detection)
/// belongs to the broker's client machinery.
pub trait OutboundQueue {
    /// Append one buffer to the queue.
    fn enqueue(&mut self, data: Bytes);
}

impl OutboundQueue for Vec<Bytes> {
    fn enqueue(&mut self, data: Bytes) {
        self.push(data);
    }
}

impl OutboundQueue for VecDeque<Bytes> {
    fn enqueue(&mut self, data: Bytes) {
        self.push_back(data);
    }
}

struct Outbound<Q> {
    queue: Q,
    /// Set once a Close frame has been enqueued so the generic
    /// connection-teardown path does not enqueue a second one.
    close_sent: bool,
}

/// Write-side state of one WebSocket connection.
///
/// The outbound queue sits behind a mutex shared by the broker's write task
/// and the read task (which enqueues Pong and Close responses). The read
/// task must not hold the lock across blocking reads; every method here
/// acquires it only around the enqueue itself.
pub struct Session<Q> {
    compress: bool,
    compression_level: i32,
    out: Mutex<Outbound<Q>>,
}

impl<Q: OutboundQueue> Session<Q> {
    /// Wrap the broker's outbound queue for a connection whose handshake
    /// negotiated `compress`.
    pub fn new(queue: Q, compress: bool, compression_level: i32) -> Session<Q> {
        Session {
            compress,
            compression_level,
            out: Mutex::new(Outbound { queue, close_sent: false }),
        }
    }

    /// Whether `permessage-deflate` was negotiated for this connection.
    pub fn compression(&self) -> bool {
        self.compress
    }

    /// Whether a Close frame has already been enqueued.
    pub fn close_frame_sent(&self) -> bool {
        self.out.lock().close_sent
    }

    /// Run `f` with the outbound queue locked. This is how the broker's
    /// write task drains what the transport has enqueued.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut Q) -> R) -> R {
        f(&mut self.out.lock().queue)
    }

    /// Frame and enqueue one broker message as a Binary frame, compressed
    /// when the connection negotiated it.
    pub fn enqueue_message(&self, payload: &[u8]) -> Result<()> {
        let (header, payload) = create_frame_and_payload(
            OpCode::Binary,
            self.compress,
            self.compression_level,
            payload,
        )?;
        let mut out = self.out.lock();
        out.queue.enqueue(header.into());
        if !payload.is_empty() {
            out.queue.enqueue(Bytes::copy_from_slice(&payload));
        }
        Ok(())
    }

    /// Enqueue a control frame under the outbound lock.
    pub fn enqueue_control(&self, opcode: OpCode, payload: &[u8]) {
        let mut out = self.out.lock();
        enqueue_control_locked(&mut out, opcode, payload);
    }

    /// Enqueue a Close frame whose status reflects why the broker is
    /// dropping the connection; the body is the reason's readable name.
    pub fn enqueue_close(&self, reason: DisconnectReason) {
        let body = create_close_message(reason.close_status(), &reason.to_string());
        self.enqueue_control(OpCode::Close, &body);
    }

    /// Enqueue a Close(protocol error) carrying `msg` and return the same
    /// message as the error that terminates the read loop.
    pub(crate) fn handle_protocol_error(&self, msg: Cow<'static, str>) -> Error {
        let body = create_close_message(CloseStatus::ProtocolError.into(), &msg);
        self.enqueue_control(OpCode::Close, &body);
        Error::Protocol(msg)
    }
}

/// Caller holds the outbound lock. Control frames are never compressed.
fn enqueue_control_locked<Q: OutboundQueue>(out: &mut Outbound<Q>, opcode: OpCode, payload: &[u8]) {
    let header = frame_header(false, opcode, payload.len());
    out.queue.enqueue(header.into());
    if !payload.is_empty() {
        out.queue.enqueue(Bytes::copy_from_slice(payload));
    }
    if opcode == OpCode::Close {
        out.close_sent = true;
    }
}

/// Why the broker is closing a connection. The transport's only use for
/// this is picking the Close status and body sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The client closed the connection normally.
    ClientClosed,
    /// The client did not authenticate in time.
    AuthenticationTimeout,
    /// Authentication failed.
    AuthenticationViolation,
    /// The client's credentials expired mid-connection.
    AuthenticationExpired,
    /// The client's credentials were revoked.
    Revocation,
    /// Too many bytes pending in the outbound queue.
    SlowConsumerPendingBytes,
    /// A write to the client exceeded its deadline.
    SlowConsumerWriteDeadline,
    /// Account connection quota exhausted.
    MaxAccountConnectionsExceeded,
    /// Server connection quota exhausted.
    MaxConnectionsExceeded,
    /// Protocol line longer than permitted.
    MaxControlLineExceeded,
    /// Subscription quota exhausted.
    MaxSubscriptionsExceeded,
    /// Published payload larger than permitted.
    MaxPayloadExceeded,
    /// No account associated with the client.
    MissingAccount,
    /// TLS handshake failed.
    TlsHandshakeError,
    /// The broker's protocol parser rejected the input.
    ParseError,
    /// The client violated the broker protocol.
    ProtocolViolation,
    /// Unsupported client protocol version.
    BadClientProtocolVersion,
    /// The server is shutting down.
    ServerShutdown,
    /// A write to the connection failed.
    WriteError,
    /// A read from the connection failed.
    ReadError,
    /// The connection went silent past its ping deadline.
    StaleConnection,
    /// Anything the other variants do not cover.
    InternalError,
}

impl DisconnectReason {
    /// Map a closure reason to the WebSocket close status sent on the wire.
    pub fn close_status(self) -> u16 {
        use DisconnectReason::*;
        let status = match self {
            ClientClosed => CloseStatus::Normal,
            AuthenticationTimeout | AuthenticationViolation | AuthenticationExpired | Revocation
            | SlowConsumerPendingBytes | SlowConsumerWriteDeadline
            | MaxAccountConnectionsExceeded | MaxConnectionsExceeded | MaxControlLineExceeded
            | MaxSubscriptionsExceeded | MissingAccount => CloseStatus::PolicyViolation,
            TlsHandshakeError => CloseStatus::TlsHandshake,
            ParseError | ProtocolViolation | BadClientProtocolVersion => {
                CloseStatus::ProtocolError
            }
            MaxPayloadExceeded => CloseStatus::MessageTooBig,
            ServerShutdown => CloseStatus::GoingAway,
            WriteError | ReadError | StaleConnection => CloseStatus::AbnormalClosure,
            InternalError => CloseStatus::InternalError,
        };
        status.into()
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DisconnectReason::*;
        let name = match *self {
            ClientClosed => "Client Closed",
            AuthenticationTimeout => "Authentication Timeout",
            AuthenticationViolation => "Authentication Failure",
            AuthenticationExpired => "Authentication Expired",
            Revocation => "Credentials Revoked",
            SlowConsumerPendingBytes => "Slow Consumer (Pending Bytes)",
            SlowConsumerWriteDeadline => "Slow Consumer (Write Deadline)",
            MaxAccountConnectionsExceeded => "Maximum Account Connections Exceeded",
            MaxConnectionsExceeded => "Maximum Connections Exceeded",
            MaxControlLineExceeded => "Maximum Control Line Exceeded",
            MaxSubscriptionsExceeded => "Maximum Subscriptions Exceeded",
            MaxPayloadExceeded => "Maximum Payload Violation",
            MissingAccount => "Missing Account",
            TlsHandshakeError => "TLS Handshake Failure",
            ParseError => "Parse Error",
            ProtocolViolation => "Protocol Violation",
            BadClientProtocolVersion => "Bad Client Protocol Version",
            ServerShutdown => "Server Shutdown",
            WriteError => "Write Error",
            ReadError => "Read Error",
            StaleConnection => "Stale Connection",
            InternalError => "Internal Error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deflate;
    use crate::protocol::frame::coding::{FIN_BIT, MASK_BIT, RSV1_BIT};

    fn new_session(compress: bool) -> Session<Vec<Bytes>> {
        Session::new(Vec::new(), compress, deflate::DEFAULT_COMPRESSION_LEVEL)
    }

    #[test]
    fn control_frame_layout() {
        let session = new_session(false);
        session.enqueue_control(OpCode::Pong, b"hi");
        let bufs = session.with_queue(|q| q.clone());
        assert_eq!(bufs.len(), 2);
        assert_eq!(&bufs[0][..], &[FIN_BIT | OpCode::Pong as u8, 2]);
        assert_eq!(&bufs[1][..], b"hi");
        assert!(!session.close_frame_sent());
    }

    #[test]
    fn empty_control_payload_enqueues_header_only() {
        let session = new_session(false);
        session.enqueue_control(OpCode::Ping, b"");
        let bufs = session.with_queue(|q| q.clone());
        assert_eq!(bufs.len(), 1);
        assert_eq!(&bufs[0][..], &[FIN_BIT | OpCode::Ping as u8, 0]);
    }

    #[test]
    fn close_marks_session() {
        let session = new_session(false);
        session.enqueue_close(DisconnectReason::ServerShutdown);
        assert!(session.close_frame_sent());
        let bufs = session.with_queue(|q| q.clone());
        let payload = &bufs[1];
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1001);
        assert_eq!(&payload[2..], b"Server Shutdown");
    }

    #[test]
    fn reason_status_mapping() {
        use DisconnectReason::*;
        let table = [
            (ClientClosed, 1000),
            (AuthenticationTimeout, 1008),
            (AuthenticationViolation, 1008),
            (AuthenticationExpired, 1008),
            (Revocation, 1008),
            (SlowConsumerPendingBytes, 1008),
            (SlowConsumerWriteDeadline, 1008),
            (MaxAccountConnectionsExceeded, 1008),
            (MaxConnectionsExceeded, 1008),
            (MaxControlLineExceeded, 1008),
            (MaxSubscriptionsExceeded, 1008),
            (MissingAccount, 1008),
            (TlsHandshakeError, 1015),
            (ParseError, 1002),
            (ProtocolViolation, 1002),
            (BadClientProtocolVersion, 1002),
            (MaxPayloadExceeded, 1009),
            (ServerShutdown, 1001),
            (WriteError, 1006),
            (ReadError, 1006),
            (StaleConnection, 1006),
            (InternalError, 1011),
        ];
        for (reason, status) in table {
            assert_eq!(reason.close_status(), status, "{reason}");
        }
    }

    #[test]
    fn protocol_error_enqueues_close() {
        let session = new_session(false);
        let err = session.handle_protocol_error("mask bit missing".into());
        assert!(matches!(err, Error::Protocol(ref m) if m == "mask bit missing"));
        assert!(session.close_frame_sent());
        let bufs = session.with_queue(|q| q.clone());
        assert_eq!(bufs[0][0], FIN_BIT | OpCode::Close as u8);
        let payload = &bufs[1];
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1002);
        assert_eq!(&payload[2..], b"mask bit missing");
    }

    #[test]
    fn plain_message_framing() {
        let session = new_session(false);
        session.enqueue_message(b"MSG foo 1 2\r\nok\r\n").unwrap();
        let bufs = session.with_queue(|q| q.clone());
        assert_eq!(bufs.len(), 2);
        assert_eq!(bufs[0][0], FIN_BIT | OpCode::Binary as u8);
        assert_eq!(bufs[0][1] & MASK_BIT, 0, "server frames are unmasked");
        assert_eq!(bufs[0][1] as usize, bufs[1].len());
        assert_eq!(&bufs[1][..], b"MSG foo 1 2\r\nok\r\n");
    }

    #[test]
    fn compressed_message_sets_rsv1() {
        let session = new_session(true);
        session.enqueue_message(b"MSG foo 1 7\r\nfrom ws\r\n").unwrap();
        let bufs = session.with_queue(|q| q.clone());
        assert_eq!(bufs[0][0] & RSV1_BIT, RSV1_BIT);
    }
}
