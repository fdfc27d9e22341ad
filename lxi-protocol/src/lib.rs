//! # LXI Protocol Library
//!
//! Wire-level building blocks for talking SCPI to bench instruments
//! (oscilloscopes, function generators, electronic loads, power supplies)
//! over the raw TCP socket defined by LXI.
//!
//! ## Overview
//!
//! Nothing in this crate touches a socket. It provides:
//!
//! - Command encoding: trimmed ASCII, terminated by a single LF
//! - Parsing of the `*IDN?` identity and of instrument endpoints
//! - Permissive decoding of text replies into booleans, integers, floats and strings
//! - Location of IEEE 488.2 definite-length blocks and bitmap screenshots in a reply
//! - Waveform preamble parsing and sample scaling
//!
//! ## Basic Usage
//!
//! ### Encoding a Command
//!
//! ```
//! use lxi_protocol::command::encode_command;
//!
//! let bytes = encode_command("  MEAS:VOLT?  ").expect("Command is not empty");
//! assert_eq!(bytes, b"MEAS:VOLT?\n");
//! ```
//!
//! ### Decoding a Reply
//!
//! ```
//! use lxi_protocol::{Decoded, Reply};
//!
//! let reply = Reply::from(&b"1.250000E+00\n"[..]);
//! assert_eq!(reply.float(), Decoded::Value(1.25));
//!
//! // Instruments sometimes answer with an error string instead
//! let reply = Reply::from(&b"ERR\n"[..]);
//! assert!(reply.to_float().is_nan());
//! assert_eq!(reply.to_int(), i64::MIN);
//! ```
//!
//! ### Reading a Waveform Block
//!
//! ```
//! use lxi_protocol::{Preamble, block::block_payload};
//!
//! let preamble = Preamble::parse("0,0,2,1,1e-3,0,0,0.01,0,128").unwrap();
//! let payload = block_payload(b"#12\x80\xe4\n").unwrap().unwrap();
//! let waveform = preamble.decode(payload);
//! let volts: Vec<f64> = waveform.values().collect();
//! assert!((volts[0] - 0.0).abs() < 1e-9);
//! assert!((volts[1] - 1.0).abs() < 1e-9);
//! ```
//!
//! ## Message Format
//!
//! - **Command**: `<ascii command>\n`
//! - **Text reply**: `<ascii>\n`, with no length field
//! - **Identity**: `<manufacturer>,<model>,<serial>,<firmware>\n`
//! - **Definite-length block**: `#<n><n digits: length L><L bytes>`
//! - **Bitmap**: any prefix, then a bitmap file starting with `BM`
//!
//! ## Error Handling
//!
//! Structural failures (empty command, malformed identity, preamble or block
//! header) use [`error::ProtocolError`]. Scalar replies that fail to parse are
//! not errors; see [`Decoded`].
//!
//! ## Features
//!
//! - `tokio`: enables [`codec`], `tokio_util` framers for lines and blocks.
pub mod protocol;
pub use protocol::*;
pub mod block;
#[cfg(feature = "tokio")]
pub mod codec;
pub mod command;
pub mod decode;
pub use decode::{Decoded, Reply};
pub mod error;
pub mod waveform;
pub use waveform::{Preamble, Sample, Waveform};
