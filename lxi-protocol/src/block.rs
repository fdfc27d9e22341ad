//! Locating binary payloads inside a reply.
//!
//! Two shapes exist: IEEE 488.2 definite-length blocks
//! (`#<n><n digits of length><bytes>`), used for waveform samples, and
//! bitmap screenshots, which start at the `BM` magic after whatever the
//! instrument chose to prefix.
use crate::error::ProtocolError;

pub const BLOCK_SENTINEL: u8 = b'#';
pub const BITMAP_MAGIC: &[u8; 2] = b"BM";

/// Result of scanning a buffer for a definite-length block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockScan {
    /// No `#` in the buffer yet.
    NoHeader,
    /// A header was found but at least `needed` more bytes must arrive.
    Incomplete { needed: usize },
    /// The payload occupies `start..start + len`.
    Complete { start: usize, len: usize },
}

/// Scans `buf` for the first definite-length block.
///
/// Only the declared number of bytes belongs to the payload; anything after
/// it is ignored.
pub fn locate_block(buf: &[u8]) -> Result<BlockScan, ProtocolError> {
    let Some(hash) = buf.iter().position(|b| *b == BLOCK_SENTINEL) else {
        return Ok(BlockScan::NoHeader);
    };

    let Some(&count) = buf.get(hash + 1) else {
        return Ok(BlockScan::Incomplete { needed: 1 });
    };
    let num_digits = match count {
        b'1'..=b'9' => (count - b'0') as usize,
        b'0' => {
            return Err(ProtocolError::InvalidBlockHeader(
                "Indefinite-length blocks are not supported".to_string(),
            ));
        }
        other => {
            return Err(ProtocolError::InvalidBlockHeader(format!(
                "Expected digit count after '#', got {:?}",
                other as char
            )));
        }
    };

    let digits_start = hash + 2;
    let start = digits_start + num_digits;
    if buf.len() < start {
        return Ok(BlockScan::Incomplete {
            needed: start - buf.len(),
        });
    }

    let digits = &buf[digits_start..start];
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::InvalidBlockHeader(format!(
            "Non-digit in length field {:?}",
            String::from_utf8_lossy(digits)
        )));
    }
    let len = digits
        .iter()
        .try_fold(0usize, |acc, d| {
            acc.checked_mul(10)?.checked_add((d - b'0') as usize)
        })
        .ok_or_else(|| ProtocolError::InvalidBlockHeader("Length overflows".to_string()))?;

    let end = start + len;
    if buf.len() < end {
        Ok(BlockScan::Incomplete {
            needed: end - buf.len(),
        })
    } else {
        Ok(BlockScan::Complete { start, len })
    }
}

/// The payload of a complete block in `buf`, if there is one.
pub fn block_payload(buf: &[u8]) -> Result<Option<&[u8]>, ProtocolError> {
    match locate_block(buf)? {
        BlockScan::Complete { start, len } => Ok(Some(&buf[start..start + len])),
        _ => Ok(None),
    }
}

/// Offset of the first bitmap magic in `buf`.
pub fn find_bitmap_start(buf: &[u8]) -> Option<usize> {
    buf.windows(BITMAP_MAGIC.len())
        .position(|window| window == BITMAP_MAGIC)
}

/// File size declared in a bitmap header. `bitmap` must start at the magic.
pub fn bitmap_declared_len(bitmap: &[u8]) -> Option<usize> {
    if !bitmap.starts_with(BITMAP_MAGIC) {
        return None;
    }
    let size: [u8; 4] = bitmap.get(2..6)?.try_into().ok()?;
    Some(u32::from_le_bytes(size) as usize)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn declared_length_is_honoured() {
        let mut buf = b"#212".to_vec();
        buf.extend_from_slice(&[7u8; 12]);
        buf.extend_from_slice(b"trailing\n");
        assert_eq!(
            locate_block(&buf).unwrap(),
            BlockScan::Complete { start: 4, len: 12 }
        );
        assert_eq!(block_payload(&buf).unwrap().unwrap(), &[7u8; 12]);
    }

    #[test]
    fn skips_leading_chatter() {
        let buf = b"junk#15hello\n";
        assert_eq!(block_payload(buf).unwrap().unwrap(), b"hello");
    }

    #[test]
    fn reports_missing_bytes() {
        assert_eq!(locate_block(b"abc").unwrap(), BlockScan::NoHeader);
        assert_eq!(
            locate_block(b"#").unwrap(),
            BlockScan::Incomplete { needed: 1 }
        );
        assert_eq!(
            locate_block(b"#41").unwrap(),
            BlockScan::Incomplete { needed: 3 }
        );
        assert_eq!(
            locate_block(b"#210abc").unwrap(),
            BlockScan::Incomplete { needed: 7 }
        );
        assert_eq!(block_payload(b"#210abc").unwrap(), None);
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(
            locate_block(b"#0abc\n"),
            Err(ProtocolError::InvalidBlockHeader(_))
        ));
        assert!(matches!(
            locate_block(b"#x12"),
            Err(ProtocolError::InvalidBlockHeader(_))
        ));
        assert!(matches!(
            locate_block(b"#21x"),
            Err(ProtocolError::InvalidBlockHeader(_))
        ));
    }

    #[test]
    fn zero_length_block() {
        assert_eq!(
            locate_block(b"#10\n").unwrap(),
            BlockScan::Complete { start: 3, len: 0 }
        );
    }

    #[test]
    fn bitmap_magic() {
        let buf = b"#9000000070BM\x46\x00\x00\x00rest";
        let start = find_bitmap_start(buf).unwrap();
        assert_eq!(start, 11);
        assert_eq!(bitmap_declared_len(&buf[start..]), Some(70));
        assert_eq!(find_bitmap_start(b"no image here"), None);
        assert_eq!(bitmap_declared_len(b"BM\x01"), None);
    }
}
