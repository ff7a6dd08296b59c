//! Primitive codec over the byte streams
//!
//! Fixed-width little-endian scalars, plus length-prefixed byte arrays and
//! UTF-8 strings.
//!
//! # Format
//!
//! ```text
//! byte     1 byte
//! bool     1 byte (non-zero = true)
//! char     2 bytes (BMP code point)
//! short    2 bytes
//! int      4 bytes
//! long     8 bytes
//! float    4 bytes (IEEE 754)
//! double   8 bytes (IEEE 754)
//! uuid     16 bytes
//!
//! byte array / string:
//! ┌──────────────────────┬─────────────────────────┐
//! │ len + 1 (u32, 0=null)│ payload (len bytes)     │
//! └──────────────────────┴─────────────────────────┘
//! ```

use crate::error::{Result, SerializationError};
use crate::stream::{ByteInputStream, ByteOutputStream};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use std::any::Any;
use uuid::Uuid;

/// UUID-keyed side channel for passing typed context through a call chain.
#[derive(Default)]
pub struct Extensions {
    values: FxHashMap<Uuid, Box<dyn Any>>,
}

impl Extensions {
    /// Create an empty extension map
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an extension by id, if present and of type `T`
    pub fn get<T: Any>(&self, id: &Uuid) -> Option<&T> {
        self.values.get(id).and_then(|v| v.downcast_ref::<T>())
    }

    /// Get a mutable extension by id, if present and of type `T`
    pub fn get_mut<T: Any>(&mut self, id: &Uuid) -> Option<&mut T> {
        self.values.get_mut(id).and_then(|v| v.downcast_mut::<T>())
    }

    /// Set an extension, replacing any previous value under the same id
    pub fn set<T: Any>(&mut self, id: Uuid, value: T) {
        self.values.insert(id, Box::new(value));
    }

    /// Remove an extension
    pub fn remove(&mut self, id: &Uuid) -> Option<Box<dyn Any>> {
        self.values.remove(id)
    }

    /// Number of extensions set
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no extensions are set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("ids", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn encode_length(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .and_then(|l| l.checked_add(1))
        .ok_or_else(|| SerializationError::invalid_argument(format!("length {} too large", len)))
}

/// Primitive writer.
#[derive(Debug, Default)]
pub struct DataSerialization {
    stream: ByteOutputStream,
    extensions: Extensions,
}

impl DataSerialization {
    /// Create a writer over a fresh stream
    pub fn new() -> Self {
        Self::with_stream(ByteOutputStream::new())
    }

    /// Create a writer appending to `stream`
    pub fn with_stream(stream: ByteOutputStream) -> Self {
        DataSerialization {
            stream,
            extensions: Extensions::new(),
        }
    }

    /// Underlying stream
    pub fn stream(&self) -> &ByteOutputStream {
        &self.stream
    }

    /// Underlying stream, mutably
    pub fn stream_mut(&mut self) -> &mut ByteOutputStream {
        &mut self.stream
    }

    /// Consume the writer and return its stream
    pub fn into_stream(self) -> ByteOutputStream {
        self.stream
    }

    /// Extension map
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Extension map, mutably
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub(crate) fn take_extensions(&mut self) -> Extensions {
        std::mem::take(&mut self.extensions)
    }

    pub(crate) fn restore_extensions(&mut self, extensions: Extensions) {
        self.extensions = extensions;
    }

    /// Write a boolean as one byte
    pub fn write_bool(&mut self, value: bool) {
        self.stream.write_byte(value as u8);
    }

    /// Write one byte
    pub fn write_byte(&mut self, value: u8) {
        self.stream.write_byte(value);
    }

    /// Write a character as a 2-byte code unit
    pub fn write_char(&mut self, value: char) -> Result<()> {
        let code = u16::try_from(value as u32).map_err(|_| {
            SerializationError::invalid_argument(format!(
                "character U+{:04X} does not fit in two bytes",
                value as u32
            ))
        })?;
        self.write_short(code as i16);
        Ok(())
    }

    /// Write a 2-byte integer
    pub fn write_short(&mut self, value: i16) {
        // Writes into ByteOutputStream cannot fail
        let _ = self.stream.write_i16::<LittleEndian>(value);
    }

    /// Write a 4-byte integer
    pub fn write_int(&mut self, value: i32) {
        let _ = self.stream.write_i32::<LittleEndian>(value);
    }

    /// Write an 8-byte integer
    pub fn write_long(&mut self, value: i64) {
        let _ = self.stream.write_i64::<LittleEndian>(value);
    }

    /// Write a 4-byte float
    pub fn write_float(&mut self, value: f32) {
        let _ = self.stream.write_f32::<LittleEndian>(value);
    }

    /// Write an 8-byte float
    pub fn write_double(&mut self, value: f64) {
        let _ = self.stream.write_f64::<LittleEndian>(value);
    }

    /// Write a UUID as 16 raw bytes
    pub fn write_uuid(&mut self, value: &Uuid) {
        self.stream.write(value.as_bytes());
    }

    /// Write raw bytes without a length prefix
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write(bytes);
    }

    /// Write a nullable, length-prefixed byte array
    pub fn write_byte_array(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            None => self.stream.write(&0u32.to_le_bytes()),
            Some(bytes) => {
                let prefix = encode_length(bytes.len())?;
                self.stream.write(&prefix.to_le_bytes());
                self.stream.write(bytes);
            }
        }
        Ok(())
    }

    /// Write a nullable, length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: Option<&str>) -> Result<()> {
        self.write_byte_array(value.map(str::as_bytes))
    }
}

/// Primitive reader.
#[derive(Debug)]
pub struct DataDeserialization {
    stream: ByteInputStream,
    extensions: Extensions,
}

impl DataDeserialization {
    /// Create a reader over `stream`
    pub fn new(stream: ByteInputStream) -> Self {
        DataDeserialization {
            stream,
            extensions: Extensions::new(),
        }
    }

    /// Underlying stream
    pub fn stream(&self) -> &ByteInputStream {
        &self.stream
    }

    /// Underlying stream, mutably
    pub fn stream_mut(&mut self) -> &mut ByteInputStream {
        &mut self.stream
    }

    /// Consume the reader and return its stream
    pub fn into_stream(self) -> ByteInputStream {
        self.stream
    }

    /// Extension map
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Extension map, mutably
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub(crate) fn take_extensions(&mut self) -> Extensions {
        std::mem::take(&mut self.extensions)
    }

    pub(crate) fn restore_extensions(&mut self, extensions: Extensions) {
        self.extensions = extensions;
    }

    /// Read a boolean
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Read one byte
    pub fn read_byte(&mut self) -> Result<u8> {
        self.stream.read_byte().ok_or(SerializationError::EndOfStream)
    }

    /// Read a 2-byte character
    pub fn read_char(&mut self) -> Result<char> {
        let code = self.read_short()? as u16;
        char::from_u32(code as u32).ok_or_else(|| {
            SerializationError::Encoding(format!("unpaired surrogate U+{:04X}", code))
        })
    }

    /// Read a 2-byte integer
    pub fn read_short(&mut self) -> Result<i16> {
        Ok(self.stream.read_i16::<LittleEndian>()?)
    }

    /// Read a 4-byte integer
    pub fn read_int(&mut self) -> Result<i32> {
        Ok(self.stream.read_i32::<LittleEndian>()?)
    }

    /// Read an 8-byte integer
    pub fn read_long(&mut self) -> Result<i64> {
        Ok(self.stream.read_i64::<LittleEndian>()?)
    }

    /// Read a 4-byte float
    pub fn read_float(&mut self) -> Result<f32> {
        Ok(self.stream.read_f32::<LittleEndian>()?)
    }

    /// Read an 8-byte float
    pub fn read_double(&mut self) -> Result<f64> {
        Ok(self.stream.read_f64::<LittleEndian>()?)
    }

    /// Read a 16-byte UUID
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let mut bytes = [0u8; 16];
        self.stream.read_exact_bytes(&mut bytes)?;
        Ok(Uuid::from_bytes(bytes))
    }

    /// Read `length` raw bytes
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        Ok(self.stream.take(length)?.to_vec())
    }

    /// Read a nullable, length-prefixed byte array
    pub fn read_byte_array(&mut self) -> Result<Option<Vec<u8>>> {
        let prefix = self.stream.read_u32::<LittleEndian>()?;
        if prefix == 0 {
            return Ok(None);
        }
        self.read_raw((prefix - 1) as usize).map(Some)
    }

    /// Read a nullable, length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<Option<String>> {
        match self.read_byte_array()? {
            None => Ok(None),
            Some(bytes) => Ok(Some(String::from_utf8(bytes)?)),
        }
    }

    /// Skip up to `n` bytes
    pub fn skip(&mut self, n: usize) -> usize {
        self.stream.skip(n as u64) as usize
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.stream.position()
    }

    /// Bytes remaining
    pub fn available(&self) -> usize {
        self.stream.available()
    }
}
