//! Bounds-checked input stream over an owned byte buffer

use crate::error::{Result, SerializationError};
use std::io;

/// Readable window over a byte buffer with a single mark slot.
///
/// Invariant: `offset <= pos <= count <= buffer.len()`, where `count` is the
/// exclusive end of the readable window.
#[derive(Debug, Clone)]
pub struct ByteInputStream {
    buffer: Vec<u8>,
    offset: usize,
    pos: usize,
    mark: usize,
    count: usize,
}

impl ByteInputStream {
    /// Create a stream over the whole buffer
    pub fn new(buffer: Vec<u8>) -> Self {
        let count = buffer.len();
        ByteInputStream {
            buffer,
            offset: 0,
            pos: 0,
            mark: 0,
            count,
        }
    }

    /// Create a stream over `buffer[offset..offset + length]`
    pub fn with_range(buffer: Vec<u8>, offset: usize, length: usize) -> Result<Self> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= buffer.len())
            .ok_or_else(|| {
                SerializationError::invalid_argument(format!(
                    "window [{}, +{}) exceeds buffer of {} bytes",
                    offset,
                    length,
                    buffer.len()
                ))
            })?;

        Ok(ByteInputStream {
            buffer,
            offset,
            pos: offset,
            mark: offset,
            count: end,
        })
    }

    /// Read one byte, `None` at end of data
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.pos < self.count {
            let b = self.buffer[self.pos];
            self.pos += 1;
            Some(b)
        } else {
            None
        }
    }

    /// Read up to `length` bytes into `buf[offset..]`.
    ///
    /// Returns the number of bytes copied, which is truncated at the end of
    /// the window, or `None` if no data remains.
    pub fn read_into(&mut self, buf: &mut [u8], offset: usize, length: usize) -> Result<Option<usize>> {
        if offset.checked_add(length).map_or(true, |end| end > buf.len()) {
            return Err(SerializationError::invalid_argument(format!(
                "destination window [{}, +{}) exceeds buffer of {} bytes",
                offset,
                length,
                buf.len()
            )));
        }

        if self.pos >= self.count {
            return Ok(None);
        }
        if length == 0 {
            return Ok(Some(0));
        }

        let n = length.min(self.count - self.pos);
        buf[offset..offset + n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(Some(n))
    }

    /// Read exactly `buf.len()` bytes or fail with `EndOfStream`
    pub fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.available() < buf.len() {
            return Err(SerializationError::EndOfStream);
        }
        buf.copy_from_slice(&self.buffer[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }

    /// Borrow the next `length` bytes and advance past them
    pub fn take(&mut self, length: usize) -> Result<&[u8]> {
        if self.available() < length {
            return Err(SerializationError::EndOfStream);
        }
        let start = self.pos;
        self.pos += length;
        Ok(&self.buffer[start..start + length])
    }

    /// Skip up to `n` bytes, clamped to the remaining data
    pub fn skip(&mut self, n: u64) -> u64 {
        let remaining = (self.count - self.pos) as u64;
        let skipped = n.min(remaining);
        self.pos += skipped as usize;
        skipped
    }

    /// Bytes remaining in the window
    pub fn available(&self) -> usize {
        self.count - self.pos
    }

    /// Absolute read position in the underlying buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the read position within the window
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos < self.offset || pos > self.count {
            return Err(SerializationError::invalid_argument(format!(
                "position {} outside window [{}, {}]",
                pos, self.offset, self.count
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Exclusive end of the readable window
    pub fn length(&self) -> usize {
        self.count
    }

    /// Whole backing buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Save the current position
    pub fn mark(&mut self) {
        self.mark = self.pos;
    }

    /// Rewind to the saved position
    pub fn reset(&mut self) {
        self.pos = self.mark;
    }

    /// Consume the stream and return its buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl io::Read for ByteInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len();
        match self.read_into(buf, 0, len) {
            Ok(Some(n)) => Ok(n),
            Ok(None) => Ok(0),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidInput, e.to_string())),
        }
    }
}
