//! Error handling.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::result;

/// Result alias used throughout the crate.
pub type Result<T> = result::Result<T, Error>;

/// Possible WebSocket transport errors.
#[derive(Debug)]
pub enum Error {
    /// The peer sent a Close frame and the reciprocal Close has been
    /// enqueued. The read loop should deliver any payloads decoded so far
    /// and then tear the connection down.
    ConnectionClosed,
    /// Input-output error on the underlying stream.
    Io(io::Error),
    /// WebSocket protocol violation by the peer.
    Protocol(Cow<'static, str>),
    /// Decompression of a `permessage-deflate` message failed.
    Inflate(String),
    /// The opening handshake was rejected. `status` is the HTTP status that
    /// was written back to the client before the connection was dropped.
    Handshake {
        /// HTTP status code sent to the client.
        status: u16,
        /// Reason the handshake was rejected.
        reason: Cow<'static, str>,
    },
    /// Invalid transport configuration.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::Io(ref err) => write!(f, "IO error: {err}"),
            Error::Protocol(ref msg) => write!(f, "{msg}"),
            Error::Inflate(ref msg) => write!(f, "{msg}"),
            Error::Handshake { ref reason, .. } => {
                write!(f, "websocket handshake error: {reason}")
            }
            Error::Config(ref msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Self {
        Error::Protocol(err.to_string().into())
    }
}
