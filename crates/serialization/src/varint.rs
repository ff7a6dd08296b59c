//! Variable-length integer helpers layered on the primitive codec
//!
//! Unsigned values use LEB128 (7 bits per byte, high bit = continuation).
//! Signed values are zig-zag mapped first so small magnitudes stay short.

use crate::data::{DataDeserialization, DataSerialization};
use crate::error::{Result, SerializationError};

/// Maximum encoded size of a `u32`
pub const MAX_VAR_INT_LEN: usize = 5;
/// Maximum encoded size of a `u64`
pub const MAX_VAR_LONG_LEN: usize = 10;

/// Write an unsigned variable-length `u32`
pub fn write_var_int(out: &mut DataSerialization, value: u32) {
    write_var_long(out, value as u64);
}

/// Write an unsigned variable-length `u64`
pub fn write_var_long(out: &mut DataSerialization, mut value: u64) {
    while value >= 0x80 {
        out.write_byte((value as u8) | 0x80);
        value >>= 7;
    }
    out.write_byte(value as u8);
}

/// Write a zig-zag encoded `i32`
pub fn write_signed_var_int(out: &mut DataSerialization, value: i32) {
    write_var_int(out, ((value << 1) ^ (value >> 31)) as u32);
}

/// Write a zig-zag encoded `i64`
pub fn write_signed_var_long(out: &mut DataSerialization, value: i64) {
    write_var_long(out, ((value << 1) ^ (value >> 63)) as u64);
}

/// Read an unsigned variable-length `u32`
pub fn read_var_int(input: &mut DataDeserialization) -> Result<u32> {
    let value = read_var(input, MAX_VAR_INT_LEN)?;
    u32::try_from(value)
        .map_err(|_| SerializationError::unsupported_format("variable-length int overflows 32 bits"))
}

/// Read an unsigned variable-length `u64`
pub fn read_var_long(input: &mut DataDeserialization) -> Result<u64> {
    read_var(input, MAX_VAR_LONG_LEN)
}

/// Read a zig-zag encoded `i32`
pub fn read_signed_var_int(input: &mut DataDeserialization) -> Result<i32> {
    let raw = read_var_int(input)?;
    Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

/// Read a zig-zag encoded `i64`
pub fn read_signed_var_long(input: &mut DataDeserialization) -> Result<i64> {
    let raw = read_var_long(input)?;
    Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

fn read_var(input: &mut DataDeserialization, max_len: usize) -> Result<u64> {
    let mut value: u64 = 0;
    for i in 0..max_len {
        let b = input.read_byte()?;
        let shift = 7 * i as u32;
        let bits = (b & 0x7F) as u64;
        if shift == 63 && bits > 1 {
            return Err(SerializationError::unsupported_format(
                "variable-length long overflows 64 bits",
            ));
        }
        value |= bits << shift;
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(SerializationError::unsupported_format(format!(
        "variable-length integer longer than {} bytes",
        max_len
    )))
}
