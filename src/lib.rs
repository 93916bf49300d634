//! WebSocket transport layer for a publish/subscribe messaging broker.
//!
//! This crate accepts browser-originated WebSocket connections carrying a
//! broker's line-oriented text protocol. It performs the opening HTTP/1.1
//! upgrade (RFC 6455), then multiplexes broker messages onto data frames
//! with optional `permessage-deflate` compression (RFC 7692).
//!
//! The pieces fit together as follows: [`server::WebSocketListener`] accepts
//! TCP (optionally TLS) connections and runs the [`handshake`] on each one.
//! The resulting raw stream is handed to the broker's client factory along
//! with the negotiated compression flag. The broker's read task feeds raw
//! bytes into a [`protocol::FrameDecoder`], which yields decoded message
//! payloads and reacts to control frames through the connection's
//! [`session::Session`]. The write path frames outbound messages with
//! [`protocol::frame`] and appends them to the session's outbound queue.
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stream;

mod deflate;

pub use config::WebSocketOptions;
pub use error::{Error, Result};
pub use protocol::FrameDecoder;
pub use server::WebSocketListener;
pub use session::{DisconnectReason, OutboundQueue, Session};
pub use stream::MaybeTlsStream;
