//! Scalar codec between raw controller memory and typed values.
//!
//! All multi-byte values are big-endian. Every accessor checks that the
//! value fits inside the buffer before touching it.

use crate::error::{Result, S7Error};
use crate::types::{S7DateTime, DATE_TIME_LEN};

/// Largest declared length of a string.
pub const MAX_STRING_LEN: u8 = 254;

/// Header bytes in front of string characters (declared length, actual length).
pub const STRING_HEADER_LEN: usize = 2;

/// Stored size of a string declared with `max_len` characters.
#[inline]
pub const fn string_size(max_len: u8) -> usize {
    STRING_HEADER_LEN + max_len as usize
}

#[inline]
fn check_bounds(buf: &[u8], offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(S7Error::OutOfRange {
            offset,
            len,
            available: buf.len(),
        }),
    }
}

#[inline]
fn check_bit(bit: u8) -> Result<()> {
    if bit > 7 {
        return Err(S7Error::InvalidBit(bit));
    }
    Ok(())
}

/// Read bit `bit` (0 = least significant) of the byte at `offset`.
pub fn get_bit(buf: &[u8], offset: usize, bit: u8) -> Result<bool> {
    check_bit(bit)?;
    check_bounds(buf, offset, 1)?;
    Ok(buf[offset] & (1 << bit) != 0)
}

/// Set or clear bit `bit` of the byte at `offset`, leaving the others untouched.
pub fn set_bit(buf: &mut [u8], offset: usize, bit: u8, value: bool) -> Result<()> {
    check_bit(bit)?;
    check_bounds(buf, offset, 1)?;
    buf[offset] = with_bit(buf[offset], bit, value);
    Ok(())
}

/// `byte` with bit `bit` set to `value`.
#[inline]
pub const fn with_bit(byte: u8, bit: u8, value: bool) -> u8 {
    if value {
        byte | (1 << bit)
    } else {
        byte & !(1 << bit)
    }
}

macro_rules! be_accessors {
    ($($ty:ty => $get:ident, $set:ident;)*) => {
        $(
            #[doc = concat!("Read a big-endian `", stringify!($ty), "` at `offset`.")]
            pub fn $get(buf: &[u8], offset: usize) -> Result<$ty> {
                const LEN: usize = std::mem::size_of::<$ty>();
                check_bounds(buf, offset, LEN)?;
                let mut raw = [0u8; LEN];
                raw.copy_from_slice(&buf[offset..offset + LEN]);
                Ok(<$ty>::from_be_bytes(raw))
            }

            #[doc = concat!("Write a big-endian `", stringify!($ty), "` at `offset`.")]
            pub fn $set(buf: &mut [u8], offset: usize, value: $ty) -> Result<()> {
                const LEN: usize = std::mem::size_of::<$ty>();
                check_bounds(buf, offset, LEN)?;
                buf[offset..offset + LEN].copy_from_slice(&value.to_be_bytes());
                Ok(())
            }
        )*
    };
}

be_accessors! {
    u8 => get_u8, set_u8;
    u16 => get_u16, set_u16;
    i16 => get_i16, set_i16;
    u32 => get_u32, set_u32;
    i32 => get_i32, set_i32;
    f32 => get_f32, set_f32;
    f64 => get_f64, set_f64;
}

/// Read a length-prefixed string at `offset`.
///
/// The actual length is clamped to the declared maximum. Non-ASCII bytes
/// decode as `?`.
pub fn get_string(buf: &[u8], offset: usize) -> Result<String> {
    check_bounds(buf, offset, STRING_HEADER_LEN)?;
    let max_len = buf[offset] as usize;
    let actual = (buf[offset + 1] as usize).min(max_len);

    let start = offset + STRING_HEADER_LEN;
    check_bounds(buf, start, actual)?;
    Ok(buf[start..start + actual]
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect())
}

/// Write `value` as a string declared with `max_len` characters.
///
/// Occupies `2 + max_len` bytes: the declared length, the actual length,
/// the characters and zero fill. Values longer than `max_len` are
/// truncated and non-ASCII characters are stored as `?`.
pub fn set_string(buf: &mut [u8], offset: usize, max_len: u8, value: &str) -> Result<()> {
    if max_len > MAX_STRING_LEN {
        return Err(S7Error::invalid_argument(format!(
            "string length {} exceeds {}",
            max_len, MAX_STRING_LEN
        )));
    }
    check_bounds(buf, offset, string_size(max_len))?;

    let area = &mut buf[offset..offset + string_size(max_len)];
    area.fill(0);
    area[0] = max_len;

    let mut actual = 0;
    for (slot, c) in area[STRING_HEADER_LEN..].iter_mut().zip(value.chars()) {
        *slot = if c.is_ascii() { c as u8 } else { b'?' };
        actual += 1;
    }
    area[1] = actual;
    Ok(())
}

/// Encode `value` into a fresh string buffer of `2 + max_len` bytes.
pub fn encode_string(value: &str, max_len: u8) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; string_size(max_len)];
    set_string(&mut buf, 0, max_len, value)?;
    Ok(buf)
}

/// Read a BCD date-time at `offset`.
pub fn get_date_time(buf: &[u8], offset: usize) -> Result<S7DateTime> {
    check_bounds(buf, offset, DATE_TIME_LEN)?;
    S7DateTime::from_bytes(&buf[offset..offset + DATE_TIME_LEN])
}

/// Write a BCD date-time at `offset`.
pub fn set_date_time(buf: &mut [u8], offset: usize, value: &S7DateTime) -> Result<()> {
    check_bounds(buf, offset, DATE_TIME_LEN)?;
    buf[offset..offset + DATE_TIME_LEN].copy_from_slice(&value.to_bytes()?);
    Ok(())
}

/// Decode consecutive big-endian INTs.
pub fn decode_int_array(buf: &[u8]) -> Vec<i16> {
    buf.chunks_exact(2)
        .map(|c| i16::from_be_bytes([c[0], c[1]]))
        .collect()
}

/// Encode INTs back to back.
pub fn encode_int_array(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Decode consecutive big-endian REALs.
pub fn decode_real_array(buf: &[u8]) -> Vec<f32> {
    buf.chunks_exact(4)
        .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Encode REALs back to back.
pub fn encode_real_array(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}
