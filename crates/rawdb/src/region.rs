//! Bounds-checked views over page bytes
//!
//! Scalars are little-endian. Strings use the same `length + 1` prefix as
//! the serialization codec (a zero prefix is null).

use crate::error::{RawDatabaseError, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::ops::Range;

pub(crate) fn check(len: usize, offset: usize, length: usize) -> Result<Range<usize>> {
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(RawDatabaseError::invalid_argument(format!(
            "range {}+{} is outside region of {} bytes",
            offset, length, len
        ))),
    }
}

macro_rules! read_methods {
    () => {
        /// Read one byte
        pub fn read_byte(&self, offset: usize) -> Result<u8> {
            Ok(self.bytes(offset, 1)?[0])
        }

        /// Read a 2-byte integer
        pub fn read_short(&self, offset: usize) -> Result<i16> {
            Ok(LittleEndian::read_i16(self.bytes(offset, 2)?))
        }

        /// Read a 2-byte character
        pub fn read_char(&self, offset: usize) -> Result<char> {
            let code = LittleEndian::read_u16(self.bytes(offset, 2)?);
            char::from_u32(code as u32).ok_or_else(|| {
                RawDatabaseError::invalid_argument(format!(
                    "0x{:04X} at {} is not a character",
                    code, offset
                ))
            })
        }

        /// Read a 4-byte integer
        pub fn read_int(&self, offset: usize) -> Result<i32> {
            Ok(LittleEndian::read_i32(self.bytes(offset, 4)?))
        }

        /// Read an 8-byte integer
        pub fn read_long(&self, offset: usize) -> Result<i64> {
            Ok(LittleEndian::read_i64(self.bytes(offset, 8)?))
        }

        /// Read a 4-byte float
        pub fn read_float(&self, offset: usize) -> Result<f32> {
            Ok(LittleEndian::read_f32(self.bytes(offset, 4)?))
        }

        /// Read an 8-byte float
        pub fn read_double(&self, offset: usize) -> Result<f64> {
            Ok(LittleEndian::read_f64(self.bytes(offset, 8)?))
        }

        /// Fill `dst` with consecutive 8-byte integers starting at `offset`
        pub fn read_long_array(&self, offset: usize, dst: &mut [i64]) -> Result<()> {
            let bytes = self.bytes(offset, dst.len() * 8)?;
            LittleEndian::read_i64_into(bytes, dst);
            Ok(())
        }

        /// Fill `dst` with consecutive 4-byte integers starting at `offset`
        pub fn read_int_array(&self, offset: usize, dst: &mut [i32]) -> Result<()> {
            let bytes = self.bytes(offset, dst.len() * 4)?;
            LittleEndian::read_i32_into(bytes, dst);
            Ok(())
        }

        /// Read a nullable length-prefixed UTF-8 string
        pub fn read_string(&self, offset: usize) -> Result<Option<String>> {
            let prefix = LittleEndian::read_u32(self.bytes(offset, 4)?);
            if prefix == 0 {
                return Ok(None);
            }
            let bytes = self.bytes(offset + 4, (prefix - 1) as usize)?;
            String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| RawDatabaseError::invalid_argument(e.to_string()))
        }
    };
}

/// Read-only view of a page range.
#[derive(Debug, Clone, Copy)]
pub struct ReadRegion<'a> {
    data: &'a [u8],
}

impl<'a> ReadRegion<'a> {
    /// Wrap a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        ReadRegion { data }
    }

    /// Region length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the region is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whole region as a slice
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// `length` bytes at `offset`
    pub fn bytes(&self, offset: usize, length: usize) -> Result<&'a [u8]> {
        let range = check(self.data.len(), offset, length)?;
        Ok(&self.data[range])
    }

    /// Nested view of `length` bytes at `offset`
    pub fn sub_region(&self, offset: usize, length: usize) -> Result<ReadRegion<'a>> {
        self.bytes(offset, length).map(ReadRegion::new)
    }

    read_methods!();
}

/// Mutable view of a page range.
#[derive(Debug)]
pub struct WriteRegion<'a> {
    data: &'a mut [u8],
}

impl<'a> WriteRegion<'a> {
    /// Wrap a mutable byte slice
    pub fn new(data: &'a mut [u8]) -> Self {
        WriteRegion { data }
    }

    /// Region length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the region is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whole region as a slice
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..]
    }

    /// Read-only view of this region
    pub fn as_read(&self) -> ReadRegion<'_> {
        ReadRegion::new(&self.data[..])
    }

    /// `length` bytes at `offset`
    pub fn bytes(&self, offset: usize, length: usize) -> Result<&[u8]> {
        let range = check(self.data.len(), offset, length)?;
        Ok(&self.data[range])
    }

    /// `length` mutable bytes at `offset`
    pub fn bytes_mut(&mut self, offset: usize, length: usize) -> Result<&mut [u8]> {
        let range = check(self.data.len(), offset, length)?;
        Ok(&mut self.data[range])
    }

    /// Nested mutable view of `length` bytes at `offset`
    pub fn sub_region(&mut self, offset: usize, length: usize) -> Result<WriteRegion<'_>> {
        self.bytes_mut(offset, length).map(WriteRegion::new)
    }

    read_methods!();

    /// Write one byte
    pub fn write_byte(&mut self, offset: usize, value: u8) -> Result<()> {
        self.bytes_mut(offset, 1)?[0] = value;
        Ok(())
    }

    /// Write a 2-byte integer
    pub fn write_short(&mut self, offset: usize, value: i16) -> Result<()> {
        LittleEndian::write_i16(self.bytes_mut(offset, 2)?, value);
        Ok(())
    }

    /// Write a 2-byte character
    pub fn write_char(&mut self, offset: usize, value: char) -> Result<()> {
        let code = u16::try_from(value as u32).map_err(|_| {
            RawDatabaseError::invalid_argument(format!(
                "character U+{:04X} does not fit in two bytes",
                value as u32
            ))
        })?;
        LittleEndian::write_u16(self.bytes_mut(offset, 2)?, code);
        Ok(())
    }

    /// Write a 4-byte integer
    pub fn write_int(&mut self, offset: usize, value: i32) -> Result<()> {
        LittleEndian::write_i32(self.bytes_mut(offset, 4)?, value);
        Ok(())
    }

    /// Write an 8-byte integer
    pub fn write_long(&mut self, offset: usize, value: i64) -> Result<()> {
        LittleEndian::write_i64(self.bytes_mut(offset, 8)?, value);
        Ok(())
    }

    /// Write a 4-byte float
    pub fn write_float(&mut self, offset: usize, value: f32) -> Result<()> {
        LittleEndian::write_f32(self.bytes_mut(offset, 4)?, value);
        Ok(())
    }

    /// Write an 8-byte float
    pub fn write_double(&mut self, offset: usize, value: f64) -> Result<()> {
        LittleEndian::write_f64(self.bytes_mut(offset, 8)?, value);
        Ok(())
    }

    /// Write consecutive 8-byte integers starting at `offset`
    pub fn write_long_array(&mut self, offset: usize, values: &[i64]) -> Result<()> {
        LittleEndian::write_i64_into(values, self.bytes_mut(offset, values.len() * 8)?);
        Ok(())
    }

    /// Write consecutive 4-byte integers starting at `offset`
    pub fn write_int_array(&mut self, offset: usize, values: &[i32]) -> Result<()> {
        LittleEndian::write_i32_into(values, self.bytes_mut(offset, values.len() * 4)?);
        Ok(())
    }

    /// Write a nullable length-prefixed string, returning the bytes used
    pub fn write_string(&mut self, offset: usize, value: Option<&str>) -> Result<usize> {
        match value {
            None => {
                self.write_int(offset, 0)?;
                Ok(4)
            }
            Some(s) => {
                let target = self.bytes_mut(offset, 4 + s.len())?;
                LittleEndian::write_u32(&mut target[..4], s.len() as u32 + 1);
                target[4..].copy_from_slice(s.as_bytes());
                Ok(4 + s.len())
            }
        }
    }

    /// Set `length` bytes at `offset` to `value`
    pub fn fill(&mut self, offset: usize, length: usize, value: u8) -> Result<()> {
        self.bytes_mut(offset, length)?.fill(value);
        Ok(())
    }

    /// Copy `src` into this region at `offset`
    pub fn copy_from(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        self.bytes_mut(offset, src.len())?.copy_from_slice(src);
        Ok(())
    }

    /// Copy `length` bytes from `src` to `dst` within this region; ranges may overlap
    pub fn copy_within(&mut self, src: usize, dst: usize, length: usize) -> Result<()> {
        let range = check(self.data.len(), src, length)?;
        check(self.data.len(), dst, length)?;
        self.data.copy_within(range, dst);
        Ok(())
    }
}
