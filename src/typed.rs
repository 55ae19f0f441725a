//! Typed reads and writes on top of raw byte ranges.
//!
//! Each accessor reads or writes exactly the bytes of its value and
//! converts them with the scalar codec in [`crate::data`].

use bytes::Bytes;

use crate::client::S7Client;
use crate::data;
use crate::error::{Result, S7Error};
use crate::types::{Address, S7DateTime, DATE_TIME_LEN};

/// Declared length used for strings when none is given.
pub const DEFAULT_STRING_LEN: u8 = data::MAX_STRING_LEN;

macro_rules! typed_accessors {
    ($($ty:ty, $name:literal => $read:ident, $write:ident, $get:path, $set:path;)*) => {
        $(
            #[doc = concat!("Read a ", $name, " at `address`.")]
            pub async fn $read(&self, address: Address) -> Result<$ty> {
                let raw = self.read_exact(address, std::mem::size_of::<$ty>()).await?;
                $get(&raw, 0)
            }

            #[doc = concat!("Write a ", $name, " at `address`.")]
            pub async fn $write(&self, address: Address, value: $ty) -> Result<()> {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                $set(&mut raw, 0, value)?;
                self.write(address, Bytes::copy_from_slice(&raw)).await
            }
        )*
    };
}

impl S7Client {
    /// Read exactly `len` bytes; a truncated reply is an error.
    async fn read_exact(&self, address: Address, len: usize) -> Result<Bytes> {
        let raw = self.read(address.span(len)).await?;
        if raw.len() != len {
            return Err(S7Error::ShortRead {
                expected: len,
                actual: raw.len(),
            });
        }
        Ok(raw)
    }

    typed_accessors! {
        u8, "BYTE" => read_byte, write_byte, data::get_u8, data::set_u8;
        u16, "WORD" => read_word, write_word, data::get_u16, data::set_u16;
        i16, "INT" => read_int, write_int, data::get_i16, data::set_i16;
        u32, "DWORD" => read_dword, write_dword, data::get_u32, data::set_u32;
        i32, "DINT" => read_dint, write_dint, data::get_i32, data::set_i32;
        f32, "REAL" => read_real, write_real, data::get_f32, data::set_f32;
        f64, "LREAL" => read_lreal, write_lreal, data::get_f64, data::set_f64;
    }

    /// Read bit `bit` of the byte at `address`.
    pub async fn read_bit(&self, address: Address, bit: u8) -> Result<bool> {
        if bit > 7 {
            return Err(S7Error::InvalidBit(bit));
        }
        let raw = self.read_exact(address, 1).await?;
        data::get_bit(&raw, 0, bit)
    }

    /// Set or clear bit `bit` of the byte at `address`.
    ///
    /// Read-modify-write of the containing byte. No other caller of this
    /// client runs in between, but the controller program may.
    pub async fn write_bit(&self, address: Address, bit: u8, value: bool) -> Result<()> {
        if bit > 7 {
            return Err(S7Error::InvalidBit(bit));
        }
        self.update_byte(address, |byte| data::with_bit(byte, bit, value))
            .await
            .map(|_| ())
    }

    /// Read a string declared with `max_len` characters.
    pub async fn read_string(&self, address: Address, max_len: u8) -> Result<String> {
        let raw = self.read_exact(address, data::string_size(max_len)).await?;
        data::get_string(&raw, 0)
    }

    /// Write a string declared with `max_len` characters.
    ///
    /// Always writes the full `2 + max_len` bytes, zero-filled.
    pub async fn write_string(&self, address: Address, value: &str, max_len: u8) -> Result<()> {
        let raw = data::encode_string(value, max_len)?;
        self.write(address, Bytes::from(raw)).await
    }

    /// Read a DATE_AND_TIME value.
    pub async fn read_date_time(&self, address: Address) -> Result<S7DateTime> {
        let raw = self.read_exact(address, DATE_TIME_LEN).await?;
        data::get_date_time(&raw, 0)
    }

    /// Write a DATE_AND_TIME value.
    pub async fn write_date_time(&self, address: Address, value: &S7DateTime) -> Result<()> {
        let raw = value.to_bytes()?;
        self.write(address, Bytes::copy_from_slice(&raw)).await
    }

    /// Read `count` consecutive INTs.
    pub async fn read_int_array(&self, address: Address, count: usize) -> Result<Vec<i16>> {
        let raw = self.read_exact(address, array_len(count, 2)?).await?;
        Ok(data::decode_int_array(&raw))
    }

    /// Write consecutive INTs.
    pub async fn write_int_array(&self, address: Address, values: &[i16]) -> Result<()> {
        self.write(address, Bytes::from(data::encode_int_array(values)))
            .await
    }

    /// Read `count` consecutive REALs.
    pub async fn read_real_array(&self, address: Address, count: usize) -> Result<Vec<f32>> {
        let raw = self.read_exact(address, array_len(count, 4)?).await?;
        Ok(data::decode_real_array(&raw))
    }

    /// Write consecutive REALs.
    pub async fn write_real_array(&self, address: Address, values: &[f32]) -> Result<()> {
        self.write(address, Bytes::from(data::encode_real_array(values)))
            .await
    }
}

fn array_len(count: usize, element: usize) -> Result<usize> {
    count
        .checked_mul(element)
        .ok_or_else(|| S7Error::invalid_argument(format!("array of {} elements is too large", count)))
}
