//! Listener glue: accept connections, run the handshake, hand the raw
//! stream to the broker.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::config::WebSocketOptions;
use crate::error::{Error, Result};
use crate::handshake::upgrade;
use crate::stream::MaybeTlsStream;

/// Accepts WebSocket connections for the broker.
///
/// Each accepted socket gets the configured handshake deadline, goes
/// through the opening handshake on its own thread and, on success, is
/// passed to the broker's client factory together with the negotiated
/// compression flag. Ownership of the stream transfers to the factory.
#[derive(Debug)]
pub struct WebSocketListener {
    listener: TcpListener,
    opts: WebSocketOptions,
}

impl WebSocketListener {
    /// Bind the configured host and port. A port of `-1` binds an
    /// ephemeral port; a port of `0` means the transport is disabled and
    /// is reported as a configuration error.
    pub fn bind(opts: WebSocketOptions) -> Result<WebSocketListener> {
        opts.validate()?;
        if opts.port == 0 {
            return Err(Error::Config("websocket transport is disabled".to_owned()));
        }
        let port = if opts.port == -1 { 0 } else { opts.port as u16 };
        let listener = TcpListener::bind((opts.host.as_str(), port))?;
        let proto = if tls_enabled(&opts) { "wss" } else { "ws" };
        let addr = listener.local_addr()?;
        info!("Listening for websocket clients on {proto}://{}:{}", opts.host, addr.port());
        Ok(WebSocketListener { listener, opts })
    }

    /// Address the listener actually bound (resolves ephemeral ports).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails, invoking `on_client`
    /// with each upgraded stream and its compression flag.
    pub fn serve<F>(&self, on_client: F) -> Result<()>
    where
        F: Fn(MaybeTlsStream, bool) + Send + Sync + 'static,
    {
        let on_client = Arc::new(on_client);
        loop {
            let (socket, _) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("websocket listener error: {err}");
                    return Err(err.into());
                }
            };
            let opts = self.opts.clone();
            let on_client = Arc::clone(&on_client);
            thread::spawn(move || service(socket, &opts, &*on_client));
        }
    }
}

fn tls_enabled(opts: &WebSocketOptions) -> bool {
    #[cfg(feature = "tls")]
    {
        opts.tls.is_some()
    }
    #[cfg(not(feature = "tls"))]
    {
        let _ = opts;
        false
    }
}

/// One connection's handshake, from raw socket to broker hand-off.
fn service(socket: TcpStream, opts: &WebSocketOptions, on_client: &dyn Fn(MaybeTlsStream, bool)) {
    let deadline =
        if opts.handshake_timeout > Duration::ZERO { Some(opts.handshake_timeout) } else { None };
    // The deadline covers the TLS handshake and the HTTP exchange alike.
    if let Err(err) = socket.set_read_timeout(deadline).and_then(|_| socket.set_write_timeout(deadline)) {
        error!("websocket handshake error: {err}");
        return;
    }
    let mut stream = match secure(socket, opts) {
        Ok(stream) => stream,
        Err(err) => {
            error!("websocket handshake error: {err}");
            return;
        }
    };
    match upgrade(&mut stream, opts) {
        Ok(outcome) => {
            // Handshake done; normal read/write deadlines belong to the
            // broker's client machinery from here on.
            if let Err(err) = stream.set_timeouts(None) {
                error!("websocket handshake error: {err}");
                return;
            }
            on_client(stream, outcome.compress);
        }
        Err(err) => error!("{err}"),
    }
}

#[cfg(feature = "tls")]
fn secure(socket: TcpStream, opts: &WebSocketOptions) -> Result<MaybeTlsStream> {
    match &opts.tls {
        Some(acceptor) => {
            let tls = acceptor
                .accept(socket)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("TLS accept: {e}")))?;
            Ok(MaybeTlsStream::NativeTls(tls))
        }
        None => Ok(MaybeTlsStream::Plain(socket)),
    }
}

#[cfg(not(feature = "tls"))]
fn secure(socket: TcpStream, _opts: &WebSocketOptions) -> Result<MaybeTlsStream> {
    Ok(MaybeTlsStream::Plain(socket))
}
