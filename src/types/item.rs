//! Variable item specification, transport sizes and item return codes.

use bytes::{BufMut, BytesMut};

use super::{Area, AreaRef};
use crate::error::{Result, S7Error};

/// Variable specification tag.
pub const VAR_SPEC: u8 = 0x12;

/// Length of the S7ANY address specification that follows the tag.
pub const VAR_SPEC_LEN: u8 = 0x0A;

/// Syntax id for S7ANY addressing.
pub const SYNTAX_S7ANY: u8 = 0x10;

/// Request transport size: byte granularity.
pub const REQUEST_TRANSPORT_BYTE: u8 = 0x02;

/// Encoded length of one item specification.
pub const ITEM_SPEC_LEN: usize = 12;

/// Per-item return code carried in the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// 0xFF: success
    Success,
    /// 0x04: success, data may be truncated to fit the PDU
    SuccessTruncated,
    /// 0x01: hardware fault
    HardwareFault,
    /// 0x03: item does not exist
    ObjectNotFound,
    /// 0x05: access denied
    AccessDenied,
    /// 0x06: data type not supported
    TypeNotSupported,
    /// 0x07: data type inconsistent
    TypeInconsistent,
    /// 0x0A: item unavailable
    Unavailable,
    /// Any other code
    Unknown(u8),
}

impl ReturnCode {
    /// Parse from the wire byte.
    pub const fn from_u8(byte: u8) -> Self {
        match byte {
            0xFF => Self::Success,
            0x04 => Self::SuccessTruncated,
            0x01 => Self::HardwareFault,
            0x03 => Self::ObjectNotFound,
            0x05 => Self::AccessDenied,
            0x06 => Self::TypeNotSupported,
            0x07 => Self::TypeInconsistent,
            0x0A => Self::Unavailable,
            other => Self::Unknown(other),
        }
    }

    /// Get the wire byte.
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Success => 0xFF,
            Self::SuccessTruncated => 0x04,
            Self::HardwareFault => 0x01,
            Self::ObjectNotFound => 0x03,
            Self::AccessDenied => 0x05,
            Self::TypeNotSupported => 0x06,
            Self::TypeInconsistent => 0x07,
            Self::Unavailable => 0x0A,
            Self::Unknown(code) => *code,
        }
    }

    /// Whether a read reply with this code carries data.
    #[inline]
    pub const fn is_read_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessTruncated)
    }

    /// Human-readable description.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessTruncated => "success, possibly truncated",
            Self::HardwareFault => "hardware fault",
            Self::ObjectNotFound => "item does not exist",
            Self::AccessDenied => "access denied",
            Self::TypeNotSupported => "data type not supported",
            Self::TypeInconsistent => "data type inconsistent",
            Self::Unavailable => "item unavailable",
            Self::Unknown(_) => "unknown return code",
        }
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), self.as_u8())
    }
}

/// Transport size tag of a data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTransportSize {
    /// 0x00: no data (error replies)
    Null,
    /// 0x03: bit access, length in bits
    Bit,
    /// 0x04: byte/word/dword access, length in bits
    Byte,
    /// 0x05: integer access, length in bits
    Integer,
    /// 0x07: real access, length in bytes
    Real,
    /// 0x09: octet string, length in bytes
    OctetString,
    /// Any other tag, length taken as bytes
    Other(u8),
}

impl DataTransportSize {
    /// Parse from the wire byte.
    pub const fn from_u8(byte: u8) -> Self {
        match byte {
            0x00 => Self::Null,
            0x03 => Self::Bit,
            0x04 => Self::Byte,
            0x05 => Self::Integer,
            0x07 => Self::Real,
            0x09 => Self::OctetString,
            other => Self::Other(other),
        }
    }

    /// Get the wire byte.
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Null => 0x00,
            Self::Bit => 0x03,
            Self::Byte => 0x04,
            Self::Integer => 0x05,
            Self::Real => 0x07,
            Self::OctetString => 0x09,
            Self::Other(tag) => *tag,
        }
    }

    /// Whether the item length field counts bits rather than bytes.
    #[inline]
    pub const fn length_in_bits(&self) -> bool {
        matches!(self, Self::Bit | Self::Byte | Self::Integer)
    }

    /// Convert a length field into a byte count.
    #[inline]
    pub const fn byte_count(&self, length_field: u16) -> usize {
        if self.length_in_bits() {
            (length_field as usize).div_ceil(8)
        } else {
            length_field as usize
        }
    }
}

/// S7ANY item specification for byte-granular access.
///
/// ```text
/// +------+------+------+------+---------+---------+------+---------------+
/// | 0x12 | 0x0A | 0x10 | 0x02 | Length  | DB      | Area | Bit address   |
/// +------+------+------+------+---------+---------+------+---------------+
///                              (2, BE)   (2, BE)          (3, BE)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSpec {
    area: Area,
    db_number: u16,
    offset: u32,
    length: u16,
}

impl ItemSpec {
    /// Build an item for a byte range, checking it is encodable.
    pub fn new(range: AreaRef) -> Result<Self> {
        range.validate()?;
        let length = u16::try_from(range.length).map_err(|_| {
            S7Error::invalid_argument(format!(
                "item length {} exceeds a single request",
                range.length
            ))
        })?;
        Ok(Self {
            area: range.area,
            db_number: range.area.wire_db_number(range.db_number),
            offset: range.offset,
            length,
        })
    }

    /// Memory area.
    #[inline]
    pub const fn area(&self) -> Area {
        self.area
    }

    /// Data block number as encoded (0 outside data blocks).
    #[inline]
    pub const fn db_number(&self) -> u16 {
        self.db_number
    }

    /// Byte offset of the first byte.
    #[inline]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of bytes.
    #[inline]
    pub const fn length(&self) -> u16 {
        self.length
    }

    /// Bit address of the first byte.
    ///
    /// Fits in 24 bits: `new` only accepts ranges ending at or below
    /// `MAX_BYTE_OFFSET`.
    #[inline]
    pub const fn bit_address(&self) -> u32 {
        self.offset * 8
    }

    /// Encode the item specification.
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(VAR_SPEC);
        buf.put_u8(VAR_SPEC_LEN);
        buf.put_u8(SYNTAX_S7ANY);
        buf.put_u8(REQUEST_TRANSPORT_BYTE);
        buf.put_u16(self.length);
        buf.put_u16(self.db_number);
        buf.put_u8(self.area.code());
        let address = self.bit_address();
        buf.put_u8((address >> 16) as u8);
        buf.put_u8((address >> 8) as u8);
        buf.put_u8(address as u8);
    }
}
