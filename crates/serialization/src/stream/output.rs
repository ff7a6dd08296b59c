//! Auto-growing output stream

use crate::error::{Result, SerializationError};
use std::io;

/// Default initial capacity
pub const DEFAULT_CAPACITY: usize = 32;

/// Growable byte sink.
///
/// The backing buffer is always fully allocated (`buffer.len()` is the
/// capacity) and `length` is the logical used length. Reserved header bytes
/// are patched by index, so reallocations during a nested write never
/// invalidate a previously obtained position.
#[derive(Debug, Clone)]
pub struct ByteOutputStream {
    buffer: Vec<u8>,
    length: usize,
}

impl ByteOutputStream {
    /// Create a stream with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a stream with the given initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        ByteOutputStream {
            buffer: vec![0; capacity],
            length: 0,
        }
    }

    /// Append one byte
    pub fn write_byte(&mut self, b: u8) {
        self.ensure_capacity(self.length + 1);
        self.buffer[self.length] = b;
        self.length += 1;
    }

    /// Append all of `bytes`
    pub fn write(&mut self, bytes: &[u8]) {
        let end = self.length + bytes.len();
        self.ensure_capacity(end);
        self.buffer[self.length..end].copy_from_slice(bytes);
        self.length = end;
    }

    /// Append `bytes[offset..offset + length]`
    pub fn write_range(&mut self, bytes: &[u8], offset: usize, length: usize) -> Result<()> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                SerializationError::invalid_argument(format!(
                    "source window [{}, +{}) exceeds buffer of {} bytes",
                    offset,
                    length,
                    bytes.len()
                ))
            })?;
        self.write(&bytes[offset..end]);
        Ok(())
    }

    /// Reserve `n` zeroed bytes and return the offset where they start
    pub fn grow(&mut self, n: usize) -> usize {
        let start = self.length;
        self.ensure_capacity(start + n);
        self.buffer[start..start + n].fill(0);
        self.length += n;
        start
    }

    /// Overwrite already written bytes at `offset`
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.length)
            .ok_or_else(|| {
                SerializationError::invalid_argument(format!(
                    "patch [{}, +{}) beyond written length {}",
                    offset,
                    bytes.len(),
                    self.length
                ))
            })?;
        self.buffer[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Logical number of bytes written
    pub fn length(&self) -> usize {
        self.length
    }

    /// Allocated capacity
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Whole backing array, including unused capacity
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Logical content
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.length]
    }

    /// Full-capacity copy of the backing array.
    ///
    /// Not trimmed to the logical length; use [`as_slice`](Self::as_slice)
    /// or [`into_bytes`](Self::into_bytes) for the written content.
    pub fn to_byte_array(&self) -> Vec<u8> {
        self.buffer.clone()
    }

    /// Consume the stream, returning the logical content
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buffer.truncate(self.length);
        self.buffer
    }

    /// Discard written content, keeping the allocation
    pub fn reset(&mut self) {
        self.length = 0;
    }

    fn ensure_capacity(&mut self, required: usize) {
        if required <= self.buffer.len() {
            return;
        }
        let doubled = self.buffer.len().saturating_mul(2);
        let new_capacity = if doubled >= required { doubled } else { required };
        self.buffer.resize(new_capacity, 0);
    }
}

impl Default for ByteOutputStream {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for ByteOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ByteOutputStream::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
