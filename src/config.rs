//! WebSocket transport configuration.

use std::time::Duration;

use crate::deflate::{DEFAULT_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL, MIN_COMPRESSION_LEVEL};
use crate::error::{Error, Result};

/// Options for the WebSocket listener and per-connection behavior.
///
/// Ports follow the broker's convention: `0` disables the transport
/// entirely and `-1` binds an ephemeral port.
#[derive(Clone)]
pub struct WebSocketOptions {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; `0` = disabled, `-1` = ephemeral.
    pub port: i32,
    /// Deadline for the whole opening handshake (TLS included). Zero means
    /// no deadline.
    pub handshake_timeout: Duration,
    /// Offer `permessage-deflate` to clients that support it.
    pub compression: bool,
    /// Deflate level used for outbound frames, in [-2, 9].
    pub compression_level: i32,
    /// Enforce the `Origin` header against [`origin`](Self::origin).
    pub check_origin: bool,
    /// Expected origin host; empty means "same as the request's Host".
    pub origin: String,
    /// TLS acceptor for `wss://` listeners.
    #[cfg(feature = "tls")]
    pub tls: Option<native_tls::TlsAcceptor>,
}

impl std::fmt::Debug for WebSocketOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("WebSocketOptions");
        s.field("host", &self.host)
            .field("port", &self.port)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("compression", &self.compression)
            .field("compression_level", &self.compression_level)
            .field("check_origin", &self.check_origin)
            .field("origin", &self.origin);
        #[cfg(feature = "tls")]
        s.field("tls", &self.tls.is_some());
        s.finish()
    }
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        WebSocketOptions {
            host: "0.0.0.0".to_owned(),
            port: 0,
            handshake_timeout: Duration::from_secs(2),
            compression: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            check_origin: false,
            origin: String::new(),
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

impl WebSocketOptions {
    /// Validate the options. A disabled transport (`port == 0`) skips all
    /// other checks.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Ok(());
        }
        if self.compression_level < MIN_COMPRESSION_LEVEL
            || self.compression_level > MAX_COMPRESSION_LEVEL
        {
            return Err(Error::Config(format!(
                "valid range for compression level is [{MIN_COMPRESSION_LEVEL}, \
                 {MAX_COMPRESSION_LEVEL}], got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}
