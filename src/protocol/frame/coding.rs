//! Frame-level constants: opcodes, header bits and close status codes.

use std::fmt;

/// Final fragment bit of header byte 0.
pub const FIN_BIT: u8 = 0x80;
/// Reserved bit 1, used by `permessage-deflate` to mark the first frame of a
/// compressed message (RFC 7692, section 6).
pub const RSV1_BIT: u8 = 0x40;
/// Reserved bit 2.
pub const RSV2_BIT: u8 = 0x20;
/// Reserved bit 3.
pub const RSV3_BIT: u8 = 0x10;
/// Mask bit of header byte 1.
pub const MASK_BIT: u8 = 0x80;

/// Maximum payload size of a control frame (RFC 6455, section 5.5).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// WebSocket frame opcode (RFC 6455, section 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Continuation fragment of a fragmented message.
    Continuation = 0,
    /// Text data frame.
    Text = 1,
    /// Binary data frame.
    Binary = 2,
    /// Connection close control frame.
    Close = 8,
    /// Ping control frame.
    Ping = 9,
    /// Pong control frame.
    Pong = 10,
}

impl OpCode {
    /// Decode the low nibble of header byte 0. Returns `None` for the
    /// reserved opcodes 3-7 and 11-15.
    pub fn from_u8(code: u8) -> Option<OpCode> {
        match code {
            0 => Some(OpCode::Continuation),
            1 => Some(OpCode::Text),
            2 => Some(OpCode::Binary),
            8 => Some(OpCode::Close),
            9 => Some(OpCode::Ping),
            10 => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Whether this opcode denotes a control frame.
    pub fn is_control(self) -> bool {
        self as u8 >= OpCode::Close as u8
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Close status codes as they appear on the wire (RFC 6455, section 11.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    /// Normal closure.
    Normal = 1000,
    /// Endpoint going away (server shutdown).
    GoingAway = 1001,
    /// Protocol error.
    ProtocolError = 1002,
    /// No status code was present in the Close frame. Never sent on the
    /// wire; used as the default for a received Close without a body.
    NoStatusReceived = 1005,
    /// Connection dropped without a Close frame.
    AbnormalClosure = 1006,
    /// Message payload was inconsistent (e.g. invalid UTF-8).
    InvalidPayload = 1007,
    /// Policy violation.
    PolicyViolation = 1008,
    /// Message bigger than the endpoint accepts.
    MessageTooBig = 1009,
    /// Unexpected condition on the server.
    InternalError = 1011,
    /// TLS handshake failure.
    TlsHandshake = 1015,
}

impl From<CloseStatus> for u16 {
    fn from(status: CloseStatus) -> u16 {
        status as u16
    }
}
