//! Server side of the opening handshake.

use std::borrow::Cow;
use std::io::{Read, Write};

use bytes::BytesMut;
use http::header::{CONNECTION, HOST, ORIGIN, SEC_WEBSOCKET_KEY, UPGRADE};
use http::{HeaderMap, Request, StatusCode};
use httparse::Status;
use log::debug;
use url::Url;

use super::{client_offers_deflate, convert_key, header_contains};
use crate::config::WebSocketOptions;
use crate::error::{Error, Result};

/// Limit on the number of request header lines.
const MAX_HEADERS: usize = 124;

/// Read buffer granularity while collecting the request.
const READ_CHUNK: usize = 4096;

/// What the upgrade negotiated. The stream itself stays with the caller,
/// who hands it to the broker's client factory exactly once.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeOutcome {
    /// Whether `permessage-deflate` is in effect for this connection.
    pub compress: bool,
}

/// Validate and complete the opening handshake on `stream`.
///
/// Runs the RFC 6455 section 4.2.1 checks against the client's request,
/// negotiates compression when both sides support it, verifies the client
/// has not pipelined bytes after the request, and writes the 101 response.
/// Pre-101 failures write a plain HTTP error response before returning;
/// the caller drops the connection on any error.
///
/// The handshake deadline, if any, must already be armed on the underlying
/// socket; the caller clears it after this returns successfully.
pub fn upgrade<S: Read + Write>(stream: &mut S, opts: &WebSocketOptions) -> Result<UpgradeOutcome> {
    let (request, buffered) = match read_request(stream) {
        Ok(parsed) => parsed,
        // Malformed requests get a plain 400 before the socket drops.
        Err(Error::Protocol(reason)) => {
            return Err(fail(stream, StatusCode::BAD_REQUEST, reason))
        }
        Err(err) => return Err(err),
    };
    let headers = request.headers();

    // Point 1.
    if request.method() != http::Method::GET {
        return Err(fail(stream, StatusCode::METHOD_NOT_ALLOWED, "request method must be GET"));
    }
    // Point 2.
    if headers.get(HOST).map_or(true, |host| host.as_bytes().is_empty()) {
        return Err(fail(stream, StatusCode::BAD_REQUEST, "'Host' missing in request"));
    }
    // Point 3.
    if !header_contains(headers, UPGRADE.as_str(), "websocket") {
        return Err(fail(stream, StatusCode::BAD_REQUEST, "invalid value for header 'Upgrade'"));
    }
    // Point 4.
    if !header_contains(headers, CONNECTION.as_str(), "Upgrade") {
        return Err(fail(stream, StatusCode::BAD_REQUEST, "invalid value for header 'Connection'"));
    }
    // Point 5.
    let key = match headers.get(SEC_WEBSOCKET_KEY) {
        Some(key) if !key.as_bytes().is_empty() => key.as_bytes().to_vec(),
        _ => return Err(fail(stream, StatusCode::BAD_REQUEST, "key missing")),
    };
    // Point 6.
    if !header_contains(headers, "Sec-WebSocket-Version", "13") {
        return Err(fail(stream, StatusCode::BAD_REQUEST, "invalid version"));
    }
    // Point 7.
    if opts.check_origin && !origin_allowed(headers, &opts.origin) {
        return Err(fail(stream, StatusCode::FORBIDDEN, "invalid request origin"));
    }
    // Points 8 and 9: no subprotocols; the only supported extension is
    // permessage-deflate.
    let compress = opts.compression && client_offers_deflate(headers);

    // The broker speaks first only after the handshake; a client that
    // pipelined payload bytes behind its request is broken.
    if buffered > 0 {
        return Err(fail(
            stream,
            StatusCode::BAD_REQUEST,
            "client sent data before handshake is complete",
        ));
    }

    let mut response = Vec::with_capacity(256);
    response.extend_from_slice(
        b"HTTP/1.1 101 Switching Protocols\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Accept: ",
    );
    response.extend_from_slice(convert_key(&key).as_bytes());
    response.extend_from_slice(b"\r\n");
    if compress {
        response.extend_from_slice(
            b"Sec-WebSocket-Extensions: permessage-deflate; server_no_context_takeover; \
              client_no_context_takeover\r\n",
        );
    }
    response.extend_from_slice(b"\r\n");
    stream.write_all(&response)?;
    stream.flush()?;

    debug!("websocket handshake complete, compression: {compress}");
    Ok(UpgradeOutcome { compress })
}

/// Collect and parse the upgrade request. Returns the parsed request and
/// the number of bytes the client sent beyond it.
fn read_request<S: Read>(stream: &mut S) -> Result<(Request<()>, usize)> {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        if let Some((size, request)) = try_parse(&buf)? {
            return Ok((request, buf.len() - size));
        }
        let start = buf.len();
        buf.resize(start + READ_CHUNK, 0);
        let n = stream.read(&mut buf[start..])?;
        buf.truncate(start + n);
        if n == 0 {
            return Err(Error::Handshake {
                status: 0,
                reason: "client closed connection before handshake completed".into(),
            });
        }
    }
}

/// One parse attempt over the bytes collected so far. `None` means the
/// request is still incomplete.
fn try_parse(buf: &[u8]) -> Result<Option<(usize, Request<()>)>> {
    let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Request::new(&mut header_buf);
    match raw.parse(buf)? {
        Status::Partial => Ok(None),
        Status::Complete(size) => {
            if raw.version != Some(1) {
                return Err(Error::Protocol("HTTP version must be 1.1".into()));
            }
            let mut headers = HeaderMap::with_capacity(raw.headers.len());
            for header in raw.headers.iter() {
                let name = http::header::HeaderName::from_bytes(header.name.as_bytes())
                    .map_err(|e| Error::Protocol(e.to_string().into()))?;
                let value = http::HeaderValue::from_bytes(header.value)
                    .map_err(|e| Error::Protocol(e.to_string().into()))?;
                headers.append(name, value);
            }
            let mut request = Request::new(());
            *request.method_mut() = raw
                .method
                .unwrap_or("GET")
                .parse()
                .map_err(|_| Error::Protocol("invalid request method".into()))?;
            *request.headers_mut() = headers;
            Ok(Some((size, request)))
        }
    }
}

/// A request with no `Origin` passes. Otherwise the origin URL's host
/// (with its explicit port, if any) must equal the expected origin, or the
/// request's own `Host` when none is configured.
fn origin_allowed(headers: &HeaderMap, expected: &str) -> bool {
    let origin = match headers.get(ORIGIN) {
        Some(origin) => origin,
        None => return true,
    };
    let origin = match origin.to_str().ok().and_then(|o| Url::parse(o).ok()) {
        Some(url) => url,
        None => return false,
    };
    let mut host = match origin.host_str() {
        Some(host) => host.to_owned(),
        None => return false,
    };
    if let Some(port) = origin.port() {
        host.push(':');
        host.push_str(&port.to_string());
    }
    let expected: Cow<'_, str> = if expected.is_empty() {
        match headers.get(HOST).and_then(|h| h.to_str().ok()) {
            Some(request_host) => request_host.into(),
            None => return false,
        }
    } else {
        expected.into()
    };
    host.eq_ignore_ascii_case(&expected)
}

/// Write a plain HTTP error response and build the handshake error that the
/// caller logs. Write failures are ignored; the connection is going away
/// either way.
fn fail<S: Write>(
    stream: &mut S,
    status: StatusCode,
    reason: impl Into<Cow<'static, str>>,
) -> Error {
    let text = status.canonical_reason().unwrap_or("");
    let _ = write!(
        stream,
        "HTTP/1.1 {} {text}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {text}\n",
        status.as_u16(),
        text.len() + 1,
    );
    let _ = stream.flush();
    Error::Handshake { status: status.as_u16(), reason: reason.into() }
}
