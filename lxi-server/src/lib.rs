//! # LXI Server Library
//!
//! This crate lets a program pose as a SCPI instrument on a raw LXI socket.
//! It exists so that clients can be developed and tested without a bench full
//! of equipment.
//!
//! ## Architecture
//!
//! The crate is built around two main components:
//!
//! - **[`ScpiInstrument`] Trait**: maps one received command to a [`Response`]
//! - **[`server::Server`]**: accepts TCP connections, splits the byte stream
//!   into LF-terminated commands and writes the responses back
//!
//! ## How It Works
//!
//! 1. A simulated instrument implements [`ScpiInstrument`]
//! 2. The instrument is wrapped in a [`server::Server`]
//! 3. The server listens for TCP connections, one client at a time, as most
//!    LXI instruments do
//! 4. Each command is handed to the instrument and its response written out
//!
//! Responses can reproduce the awkward parts of real instruments: silence,
//! replies trickling in over several segments, raw binary payloads and
//! connections dropped from the instrument side.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use lxi_server::{Response, ScpiInstrument, server::Server};
//!
//! struct Dummy;
//!
//! impl ScpiInstrument for Dummy {
//!     fn handle(&self, command: &str) -> Response {
//!         match command {
//!             "*IDN?" => Response::line("ACME,Dummy,0001,1.0"),
//!             _ => Response::None,
//!         }
//!     }
//! }
//!
//! let server = Server::new(Dummy, Config::default());
//! server.listen("127.0.0.1:5025").await?;
//! ```
//!
//! ## Logging
//!
//! This crate uses the `log` crate: connections at `info`, each command and
//! response at `debug`, response bytes at `trace`.
use std::{sync::Arc, time::Duration};

use bytes::Bytes;

pub mod server;

/// What the simulated instrument does in reply to one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Nothing is sent.
    None,
    /// Bytes sent as-is; text replies include their terminator.
    Raw(Bytes),
    /// Each segment is sent after its delay has elapsed.
    Segments(Vec<(Duration, Bytes)>),
    /// The instrument drops the connection.
    Close,
}

impl Response {
    /// A text reply, terminated with LF.
    pub fn line(text: impl AsRef<str>) -> Response {
        Response::Raw(Bytes::from(format!("{}\n", text.as_ref())))
    }

    pub fn raw(bytes: impl Into<Bytes>) -> Response {
        Response::Raw(bytes.into())
    }

    /// An IEEE 488.2 definite-length block followed by LF.
    pub fn block(payload: &[u8]) -> Response {
        let len = payload.len().to_string();
        let mut bytes = Vec::with_capacity(payload.len() + len.len() + 3);
        bytes.push(b'#');
        bytes.extend_from_slice(len.len().to_string().as_bytes());
        bytes.extend_from_slice(len.as_bytes());
        bytes.extend_from_slice(payload);
        bytes.push(b'\n');
        Response::Raw(Bytes::from(bytes))
    }
}

/// Trait that simulated instruments implement.
///
/// Commands arrive trimmed, without their terminator. The server calls
/// `handle` for one command at a time, in the order received.
pub trait ScpiInstrument: Send + Sync + 'static {
    fn handle(&self, command: &str) -> Response;
}

impl<T: ScpiInstrument> ScpiInstrument for Arc<T> {
    fn handle(&self, command: &str) -> Response {
        (**self).handle(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lxi_protocol::block::block_payload;

    #[test]
    fn line_is_terminated() {
        assert_eq!(Response::line("1"), Response::Raw(Bytes::from_static(b"1\n")));
    }

    #[test]
    fn block_header_declares_length() {
        let Response::Raw(bytes) = Response::block(&[9u8; 12]) else {
            panic!("expected raw response");
        };
        assert!(bytes.starts_with(b"#212"));
        assert_eq!(block_payload(&bytes).unwrap().unwrap(), &[9u8; 12]);
    }
}
