//! Opening handshake: HTTP/1.1 upgrade and extension negotiation.

pub mod server;

pub use self::server::{upgrade, UpgradeOutcome};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::HeaderMap;
use sha1::{Digest, Sha1};

/// Fixed GUID appended to the client key (RFC 6455, section 1.3).
const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Turn a `Sec-WebSocket-Key` into the `Sec-WebSocket-Accept` value.
pub(crate) fn convert_key(key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(WS_GUID);
    BASE64.encode(sha1.finalize())
}

/// Whether any value of header `name` contains `token` in its comma-split
/// list, compared ASCII-case-insensitively after trimming spaces and tabs.
pub(crate) fn header_contains(headers: &HeaderMap, name: &str, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim_matches(&[' ', '\t'][..]).eq_ignore_ascii_case(token))
}

/// Whether the client's `Sec-WebSocket-Extensions` offers
/// `permessage-deflate`. Parameters of the offer are ignored; the response
/// pins both `no_context_takeover` directions.
pub(crate) fn client_offers_deflate(headers: &HeaderMap) -> bool {
    headers
        .get_all("Sec-WebSocket-Extensions")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|list| list.split(','))
        .filter_map(|extension| extension.split(';').next())
        .any(|name| {
            name.trim_matches(&[' ', '\t'][..]).eq_ignore_ascii_case("permessage-deflate")
        })
}
