//! [`tokio_util::codec`] framers for the two reply shapes that carry an
//! unambiguous frame boundary: LF-terminated lines and definite-length blocks.
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    block::{BlockScan, locate_block},
    command::TERMINATOR,
    error::ProtocolError,
};

/// Splits a byte stream into LF-terminated lines, as an instrument reads
/// its commands. Outgoing frames are written as-is.
#[derive(Debug, Clone)]
pub struct ScpiCodec {
    max_len: usize,
    next_index: usize,
}

impl ScpiCodec {
    pub fn new(max_len: usize) -> ScpiCodec {
        ScpiCodec {
            max_len,
            next_index: 0,
        }
    }
}

impl Default for ScpiCodec {
    fn default() -> Self {
        ScpiCodec::new(64 * 1024)
    }
}

impl Decoder for ScpiCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        let newline = src[self.next_index..]
            .iter()
            .position(|b| *b == TERMINATOR)
            .map(|offset| self.next_index + offset);

        match newline {
            Some(index) => {
                self.next_index = 0;
                let line = src.split_to(index + 1);
                Ok(Some(String::from_utf8_lossy(&line).trim().to_string()))
            }
            None if src.len() > self.max_len => {
                let got = src.len();
                src.clear();
                self.next_index = 0;
                Err(ProtocolError::CommandTooLong {
                    max: self.max_len,
                    got,
                })
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for ScpiCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Extracts the payload of a definite-length block, discarding any bytes
/// that precede the `#` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockCodec;

impl Decoder for BlockCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        match locate_block(src)? {
            BlockScan::Complete { start, len } => {
                src.advance(start);
                Ok(Some(src.split_to(len).freeze()))
            }
            BlockScan::Incomplete { needed } => {
                src.reserve(needed);
                Ok(None)
            }
            BlockScan::NoHeader => {
                src.clear();
                Ok(None)
            }
        }
    }
}
