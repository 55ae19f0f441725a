//! Addressable memory areas of the controller.

use std::str::FromStr;

use crate::error::{Result, S7Error};

/// Highest byte offset whose bit address still fits the 24-bit address field.
pub const MAX_BYTE_OFFSET: u32 = 0x00FF_FFFF / 8;

/// Memory area of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Area {
    /// Process inputs (I / E)
    Input = 0x81,
    /// Process outputs (Q / A)
    Output = 0x82,
    /// Flag memory (M / F)
    Flags = 0x83,
    /// Numbered data block (DB)
    DataBlock = 0x84,
}

impl Area {
    /// Get the area code used in the item specification.
    #[inline]
    pub const fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse an area from its code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x81 => Ok(Self::Input),
            0x82 => Ok(Self::Output),
            0x83 => Ok(Self::Flags),
            0x84 => Ok(Self::DataBlock),
            other => Err(S7Error::invalid_argument(format!(
                "unknown area code 0x{:02X}",
                other
            ))),
        }
    }

    /// Data block number as it goes on the wire.
    ///
    /// Only data blocks carry a block number; every other area encodes 0.
    #[inline]
    pub const fn wire_db_number(&self, db_number: u16) -> u16 {
        match self {
            Self::DataBlock => db_number,
            _ => 0,
        }
    }
}

impl FromStr for Area {
    type Err = S7Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "I" | "E" | "INPUT" => Ok(Self::Input),
            "Q" | "A" | "OUTPUT" => Ok(Self::Output),
            "M" | "F" | "FLAGS" | "MEMORY" => Ok(Self::Flags),
            "DB" | "DATABLOCK" => Ok(Self::DataBlock),
            _ => Err(S7Error::invalid_argument(format!("unknown area '{}'", s))),
        }
    }
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Input => "I",
            Self::Output => "Q",
            Self::Flags => "M",
            Self::DataBlock => "DB",
        };
        write!(f, "{}", name)
    }
}

/// Start address of a typed value: area, block number and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    /// Memory area
    pub area: Area,
    /// Data block number (ignored outside `Area::DataBlock`)
    pub db_number: u16,
    /// Byte offset within the area
    pub offset: u32,
}

impl Address {
    /// Create an address in any area.
    #[inline]
    pub const fn new(area: Area, db_number: u16, offset: u32) -> Self {
        Self {
            area,
            db_number,
            offset,
        }
    }

    /// Address inside data block `db_number`.
    #[inline]
    pub const fn db(db_number: u16, offset: u32) -> Self {
        Self::new(Area::DataBlock, db_number, offset)
    }

    /// Address in the process inputs.
    #[inline]
    pub const fn input(offset: u32) -> Self {
        Self::new(Area::Input, 0, offset)
    }

    /// Address in the process outputs.
    #[inline]
    pub const fn output(offset: u32) -> Self {
        Self::new(Area::Output, 0, offset)
    }

    /// Address in flag memory.
    #[inline]
    pub const fn flags(offset: u32) -> Self {
        Self::new(Area::Flags, 0, offset)
    }

    /// Extend this address into a byte range of `length` bytes.
    #[inline]
    pub const fn span(self, length: usize) -> AreaRef {
        AreaRef {
            area: self.area,
            db_number: self.db_number,
            offset: self.offset,
            length,
        }
    }

    /// Address `delta` bytes further into the same area.
    ///
    /// Saturates at `u32::MAX`; such an address fails `AreaRef::validate`.
    #[inline]
    pub const fn advance(self, delta: u32) -> Self {
        Self::new(
            self.area,
            self.db_number,
            self.offset.saturating_add(delta),
        )
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.area {
            Area::DataBlock => write!(f, "DB{}.{}", self.db_number, self.offset),
            area => write!(f, "{}{}", area, self.offset),
        }
    }
}

/// A byte range in one memory area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AreaRef {
    /// Memory area
    pub area: Area,
    /// Data block number (ignored outside `Area::DataBlock`)
    pub db_number: u16,
    /// Byte offset of the first byte
    pub offset: u32,
    /// Number of bytes
    pub length: usize,
}

impl AreaRef {
    /// Create a byte range.
    #[inline]
    pub const fn new(area: Area, db_number: u16, offset: u32, length: usize) -> Self {
        Self {
            area,
            db_number,
            offset,
            length,
        }
    }

    /// Start address of this range.
    #[inline]
    pub const fn address(&self) -> Address {
        Address::new(self.area, self.db_number, self.offset)
    }

    /// Check that the range is non-empty and addressable.
    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            return Err(S7Error::invalid_argument("length must be greater than 0"));
        }
        let last = self.offset as u64 + self.length as u64 - 1;
        if last > MAX_BYTE_OFFSET as u64 {
            return Err(S7Error::invalid_argument(format!(
                "range {}..+{} exceeds the addressable area",
                self.address(),
                self.length
            )));
        }
        Ok(())
    }
}
