//! Convenience wrapper for plain or TLS-encrypted connections.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// A connection that may or may not be TLS-encrypted.
///
/// The handshake and the broker only need `Read + Write`; this keeps the
/// client-factory callback monomorphic whether or not TLS is configured.
pub enum MaybeTlsStream {
    /// Unencrypted TCP.
    Plain(TcpStream),
    /// TLS via native-tls.
    #[cfg(feature = "tls")]
    NativeTls(native_tls::TlsStream<TcpStream>),
}

impl MaybeTlsStream {
    /// The underlying TCP socket.
    pub fn get_ref(&self) -> &TcpStream {
        match self {
            MaybeTlsStream::Plain(s) => s,
            #[cfg(feature = "tls")]
            MaybeTlsStream::NativeTls(s) => s.get_ref(),
        }
    }

    /// Arm or clear the read/write deadlines on the underlying socket.
    pub fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        let sock = self.get_ref();
        sock.set_read_timeout(timeout)?;
        sock.set_write_timeout(timeout)
    }
}

impl Read for MaybeTlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            MaybeTlsStream::NativeTls(s) => s.read(buf),
        }
    }
}

impl Write for MaybeTlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Plain(s) => s.write(buf),
            #[cfg(feature = "tls")]
            MaybeTlsStream::NativeTls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MaybeTlsStream::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            MaybeTlsStream::NativeTls(s) => s.flush(),
        }
    }
}
