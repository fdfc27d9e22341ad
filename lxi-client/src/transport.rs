//! Byte-level exchange with the instrument: discarding stale input, sending
//! commands and collecting replies by polling the socket.
//!
//! Text replies carry no length. A read ends when the framing reports a
//! complete reply or when the active time budget runs out: a short one while
//! nothing has arrived, a longer one once the first byte is in. Instruments
//! that answer in one segment and instruments that trickle their reply over
//! several both rely on this two-phase budget.
use std::{
    io::{self, Read},
    time::{Duration, Instant},
};

use bytes::{Buf, Bytes, BytesMut};
use lxi_protocol::{
    block::{bitmap_declared_len, find_bitmap_start},
    codec::BlockCodec,
    command::{TERMINATOR, encode_command, is_query},
};
use socket2::SockRef;
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tokio_util::codec::Decoder;

use crate::{
    Config,
    error::{Error, Result, map_io_error},
};

const CHUNK_SIZE: usize = 4096;

/// Decides where a text reply ends.
pub trait Framing {
    /// Length of the complete reply at the start of `buf`, once one is present.
    fn frame_len(&mut self, buf: &[u8]) -> Option<usize>;
}

/// Ends a reply at the first occurrence of a delimiter byte, inclusive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Terminated(pub u8);

impl Default for Terminated {
    fn default() -> Self {
        Terminated(TERMINATOR)
    }
}

impl Framing for Terminated {
    fn frame_len(&mut self, buf: &[u8]) -> Option<usize> {
        buf.iter().position(|b| *b == self.0).map(|index| index + 1)
    }
}

/// Appends every byte the socket has ready without waiting.
///
/// Reads go straight to the non-blocking socket: the reactor's cached
/// readiness lags behind bytes that arrived since the task last yielded.
/// End of stream is reported as [`Error::ConnectionLost`] unless bytes were
/// collected in the same call; those are returned first.
fn drain_available(stream: &TcpStream, buf: &mut BytesMut) -> Result<usize> {
    let socket = SockRef::from(stream);
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut total = 0;
    loop {
        match (&*socket).read(&mut chunk) {
            Ok(0) if total == 0 => return Err(Error::ConnectionLost),
            Ok(0) => return Ok(total),
            Ok(n) => {
                log::trace!("Received {:02x?}", &chunk[..n]);
                buf.extend_from_slice(&chunk[..n]);
                total += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(map_io_error(e)),
        }
    }
}

/// Throws away whatever is waiting in the receive buffer.
///
/// The protocol has no request identifiers, so leftovers from a previous
/// exchange would otherwise be taken for the next reply.
pub(crate) fn clear_buffer(stream: &TcpStream) -> Result<usize> {
    let mut stale = BytesMut::new();
    let discarded = drain_available(stream, &mut stale)?;
    if discarded > 0 {
        log::warn!(
            "Discarded {} stale bytes: {:?}",
            discarded,
            String::from_utf8_lossy(&stale)
        );
    }
    Ok(discarded)
}

/// Writes one command. Never retried: a partially delivered command may
/// already have had a physical effect.
pub(crate) async fn send(stream: &mut TcpStream, command: &str, timeout: Duration) -> Result<()> {
    let bytes = encode_command(command)?;
    log::debug!("Sending {:?}", command.trim());

    let write = async {
        stream.write_all(&bytes).await?;
        stream.flush().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(map_io_error(e)),
        Err(_) => {
            log::error!("Sending {:?} timed out after {:?}", command.trim(), timeout);
            Err(Error::Timeout)
        }
    }
}

/// Collects one text reply. An empty result means the instrument stayed
/// silent for the whole first-byte budget.
pub(crate) async fn read_framed_reply<F: Framing + ?Sized>(
    stream: &TcpStream,
    config: &Config,
    framing: &mut F,
) -> Result<Vec<u8>> {
    let start = Instant::now();
    let mut buf = BytesMut::new();

    loop {
        drain_available(stream, &mut buf)?;

        if let Some(len) = framing.frame_len(&buf) {
            if buf.len() > len {
                log::warn!(
                    "Dropping {} bytes received after the end of the reply",
                    buf.len() - len
                );
                buf.truncate(len);
            }
            break;
        }

        let budget = if buf.is_empty() {
            config.first_byte_timeout
        } else {
            config.continuation_timeout
        };
        if start.elapsed() >= budget {
            if buf.is_empty() {
                log::debug!("No reply within {:?}", budget);
            } else {
                log::debug!(
                    "Reply not terminated within {:?}, keeping {} bytes",
                    budget,
                    buf.len()
                );
            }
            break;
        }

        tokio::time::sleep(config.poll_interval).await;
    }

    log::debug!("Read {} byte reply", buf.len());
    Ok(buf.to_vec())
}

/// Clears stale input, sends `command` and reads the text reply.
pub(crate) async fn query(
    stream: &mut TcpStream,
    config: &Config,
    command: &str,
) -> Result<Vec<u8>> {
    if !is_query(command) {
        log::debug!(
            "{:?} has no '?' in its header, a reply may never come",
            command.trim()
        );
    }
    clear_buffer(stream)?;
    send(stream, command, config.send_timeout).await?;
    read_framed_reply(stream, config, &mut Terminated::default()).await
}

/// Collects the payload of a definite-length block, exactly as long as its
/// header declares.
///
/// Returns `None` if no complete block arrives within the budget or if the
/// instrument answered with a text line instead.
pub(crate) async fn read_block(stream: &TcpStream, config: &Config) -> Result<Option<Bytes>> {
    let start = Instant::now();
    let mut buf = BytesMut::new();
    let mut codec = BlockCodec;
    let mut received = 0;

    loop {
        received += drain_available(stream, &mut buf)?;

        let has_header = buf.contains(&lxi_protocol::block::BLOCK_SENTINEL);
        if !has_header && buf.contains(&TERMINATOR) {
            log::warn!(
                "Expected a data block, got {:?}",
                String::from_utf8_lossy(&buf).trim()
            );
            return Ok(None);
        }

        if let Some(payload) = codec.decode(&mut buf)? {
            log::debug!("Read {} byte block", payload.len());
            return Ok(Some(payload));
        }

        let elapsed = start.elapsed();
        if received == 0 && elapsed >= config.first_byte_timeout {
            log::debug!("No block within {:?}", config.first_byte_timeout);
            return Ok(None);
        }
        if elapsed >= config.binary_timeout {
            log::warn!(
                "Block incomplete after {:?} ({} bytes received)",
                config.binary_timeout,
                received
            );
            return Ok(None);
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

/// Collects the bytes of a bitmap, starting at its magic.
///
/// The bitmap ends when its declared file size has arrived or once the
/// stream has been quiet for the settle delay.
pub(crate) async fn read_bitmap(stream: &TcpStream, config: &Config) -> Result<Option<Vec<u8>>> {
    let start = Instant::now();
    let mut last_received = start;
    let mut buf = BytesMut::new();

    loop {
        if drain_available(stream, &mut buf)? > 0 {
            last_received = Instant::now();
        }
        let quiet = last_received.elapsed() >= config.image_settle_delay;
        let expired = start.elapsed() >= config.binary_timeout;

        match find_bitmap_start(&buf) {
            Some(offset) => {
                let declared = bitmap_declared_len(&buf[offset..]);
                let complete = declared.is_some_and(|len| buf.len() - offset >= len);
                if complete || quiet || expired {
                    buf.advance(offset);
                    if let Some(len) = declared {
                        if buf.len() < len {
                            log::warn!("Bitmap truncated: {} of {} bytes", buf.len(), len);
                        }
                        buf.truncate(len);
                    }
                    log::debug!("Read {} byte bitmap", buf.len());
                    return Ok(Some(buf.to_vec()));
                }
            }
            None => {
                if buf.is_empty() && start.elapsed() >= config.first_byte_timeout {
                    log::debug!("No bitmap within {:?}", config.first_byte_timeout);
                    return Ok(None);
                }
                if (quiet && buf.contains(&TERMINATOR)) || expired {
                    log::warn!("Reply of {} bytes holds no bitmap", buf.len());
                    return Ok(None);
                }
            }
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}
