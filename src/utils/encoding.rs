//! Binary encoding helpers for segment files.
//!
//! Postings are stored as `(page-id delta, term frequency)` varint pairs;
//! strings are length-prefixed little-endian records.

use std::io::{self, Write};

/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None;
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None
}

/// Encode a sorted postings list of `(page_id, term_freq)`
pub fn encode_postings(postings: &[(u32, u32)], buf: &mut Vec<u8>) {
    let mut prev = 0u32;
    for &(page_id, tf) in postings {
        encode_varint(page_id - prev, buf);
        encode_varint(tf, buf);
        prev = page_id;
    }
}

/// Decode a postings list written by [`encode_postings`].
///
/// Stops at the first truncated pair.
pub fn decode_postings(buf: &[u8]) -> Vec<(u32, u32)> {
    let mut result = Vec::new();
    let mut prev = 0u32;
    let mut pos = 0;

    while pos < buf.len() {
        let Some((delta, used)) = decode_varint(&buf[pos..]) else {
            break;
        };
        pos += used;
        let Some((tf, used)) = decode_varint(&buf[pos..]) else {
            break;
        };
        pos += used;
        prev = prev.saturating_add(delta);
        result.push((prev, tf));
    }

    result
}

/// Write a u32-length-prefixed UTF-8 string
pub fn write_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    writer.write_all(&(value.len() as u32).to_le_bytes())?;
    writer.write_all(value.as_bytes())
}

/// Cursor over an in-memory (usually mmapped) byte slice
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> io::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated record"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap_or([0; 4])))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap_or([0; 8])))
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Read raw bytes of a known length
    pub fn read_bytes(&mut self, len: usize) -> io::Result<&'a [u8]> {
        self.take(len)
    }

    /// Read a string written by [`write_str`]
    pub fn read_str(&mut self) -> io::Result<&'a str> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Skip a length-prefixed string, returning its `(offset, len)` in the buffer
    pub fn skip_str(&mut self) -> io::Result<(usize, usize)> {
        let len = self.read_u32()? as usize;
        let offset = self.pos;
        self.take(len)?;
        Ok((offset, len))
    }
}
