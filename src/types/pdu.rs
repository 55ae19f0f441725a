//! Outbound application PDUs.
//!
//! Each request encodes to a TPKT payload: the COTP data header followed by
//! the S7 header, the parameter block and (for writes) the data block.

use bytes::{BufMut, Bytes, BytesMut};

use super::{
    AreaRef, Function, ItemSpec, S7Header, COTP_DATA_HEADER, ITEM_SPEC_LEN, REQUEST_HEADER_LEN,
};
use crate::error::{Result, S7Error};

/// Parameter length of setup communication.
pub const SETUP_PARAM_LEN: usize = 8;

/// Parameter length of a single-item read/write (function, count, item).
pub const ITEM_PARAM_LEN: usize = 2 + ITEM_SPEC_LEN;

/// Data item header: return code, transport size, 16-bit length.
pub const DATA_ITEM_HEADER_LEN: usize = 4;

/// Data transport size used for written bytes.
pub const WRITE_TRANSPORT_BYTE: u8 = 0x04;

/// Largest payload whose bit length fits the 16-bit length field.
pub const MAX_WRITE_BYTES: usize = u16::MAX as usize / 8;

/// Application request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Negotiate AmQ and PDU size
    Setup {
        /// Maximum parallel jobs as caller
        max_amq_calling: u16,
        /// Maximum parallel jobs as callee
        max_amq_called: u16,
        /// Proposed PDU size
        pdu_size: u16,
    },
    /// Read one byte range
    Read(ItemSpec),
    /// Write one byte range
    Write(ItemSpec, Bytes),
}

impl Request {
    /// Setup communication proposing `pdu_size`.
    pub fn setup(pdu_size: u16) -> Self {
        Self::Setup {
            max_amq_calling: 1,
            max_amq_called: 1,
            pdu_size,
        }
    }

    /// Read request for a byte range.
    pub fn read(range: AreaRef) -> Result<Self> {
        Ok(Self::Read(ItemSpec::new(range)?))
    }

    /// Write request for `data` starting at `range`'s address.
    pub fn write(range: AreaRef, data: Bytes) -> Result<Self> {
        if data.len() != range.length {
            return Err(S7Error::invalid_argument(format!(
                "write range of {} bytes does not match {} data bytes",
                range.length,
                data.len()
            )));
        }
        if data.len() > MAX_WRITE_BYTES {
            return Err(S7Error::invalid_argument(format!(
                "write of {} bytes exceeds the bit-length field",
                data.len()
            )));
        }
        Ok(Self::Write(ItemSpec::new(range)?, data))
    }

    /// Function code of this request.
    pub fn function(&self) -> Function {
        match self {
            Self::Setup { .. } => Function::SetupCommunication,
            Self::Read(_) => Function::ReadVar,
            Self::Write(..) => Function::WriteVar,
        }
    }

    fn param_len(&self) -> usize {
        match self {
            Self::Setup { .. } => SETUP_PARAM_LEN,
            Self::Read(_) | Self::Write(..) => ITEM_PARAM_LEN,
        }
    }

    fn data_len(&self) -> usize {
        match self {
            Self::Write(_, data) => DATA_ITEM_HEADER_LEN + data.len(),
            _ => 0,
        }
    }

    /// Encoded TPKT payload length (COTP header included).
    pub fn encoded_len(&self) -> usize {
        COTP_DATA_HEADER.len() + REQUEST_HEADER_LEN + self.param_len() + self.data_len()
    }

    /// Encode into a TPKT payload using `pdu_ref`.
    pub fn encode(&self, pdu_ref: u16) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&COTP_DATA_HEADER);
        S7Header::job(pdu_ref, self.param_len() as u16, self.data_len() as u16).encode_to(&mut buf);

        match self {
            Self::Setup {
                max_amq_calling,
                max_amq_called,
                pdu_size,
            } => {
                buf.put_u8(Function::SetupCommunication.code());
                buf.put_u8(0x00); // reserved
                buf.put_u16(*max_amq_calling);
                buf.put_u16(*max_amq_called);
                buf.put_u16(*pdu_size);
            }
            Self::Read(item) => {
                buf.put_u8(Function::ReadVar.code());
                buf.put_u8(1); // item count
                item.encode_to(&mut buf);
            }
            Self::Write(item, data) => {
                buf.put_u8(Function::WriteVar.code());
                buf.put_u8(1);
                item.encode_to(&mut buf);

                buf.put_u8(0x00); // return code placeholder
                buf.put_u8(WRITE_TRANSPORT_BYTE);
                buf.put_u16((data.len() * 8) as u16);
                buf.put_slice(data);
            }
        }

        buf.freeze()
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup { pdu_size, .. } => write!(f, "SetupCommunication(pdu={})", pdu_size),
            Self::Read(item) => write!(
                f,
                "Read(area=0x{:02X}, db={}, offset={}, len={})",
                item.area().code(),
                item.db_number(),
                item.offset(),
                item.length()
            ),
            Self::Write(item, _) => write!(
                f,
                "Write(area=0x{:02X}, db={}, offset={}, len={})",
                item.area().code(),
                item.db_number(),
                item.offset(),
                item.length()
            ),
        }
    }
}
