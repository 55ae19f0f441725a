//! S7 application header.
//!
//! ```text
//! Job / UserData (10 bytes):
//! +------+------+-----------+-----------+-----------+-----------+
//! | 0x32 | Type | Reserved  | PDU ref   | Param len | Data len  |
//! +------+------+-----------+-----------+-----------+-----------+
//!
//! Ack / AckData (12 bytes): as above, followed by error class + error code.
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{Result, S7Error};

/// Protocol identifier of every S7 PDU.
pub const PROTOCOL_ID: u8 = 0x32;

/// Header length of request PDUs.
pub const REQUEST_HEADER_LEN: usize = 10;

/// Header length of acknowledge PDUs (adds error class and code).
pub const ACK_HEADER_LEN: usize = 12;

/// S7 message type (ROSCTR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Outbound job request
    Job,
    /// Acknowledge without data (error replies)
    Ack,
    /// Acknowledge with data (regular replies)
    AckData,
    /// User data (not used by this client)
    UserData,
}

impl MessageType {
    /// Get the ROSCTR byte.
    #[inline]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Job => 0x01,
            Self::Ack => 0x02,
            Self::AckData => 0x03,
            Self::UserData => 0x07,
        }
    }

    /// Parse from the ROSCTR byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Self::Job),
            0x02 => Ok(Self::Ack),
            0x03 => Ok(Self::AckData),
            0x07 => Ok(Self::UserData),
            other => Err(S7Error::invalid_frame(format!(
                "unknown message type 0x{:02X}",
                other
            ))),
        }
    }

    /// Header length for this message type.
    #[inline]
    pub const fn header_len(&self) -> usize {
        match self {
            Self::Ack | Self::AckData => ACK_HEADER_LEN,
            Self::Job | Self::UserData => REQUEST_HEADER_LEN,
        }
    }
}

/// Parameter function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Read variable
    ReadVar,
    /// Write variable
    WriteVar,
    /// Setup communication (PDU size negotiation)
    SetupCommunication,
}

impl Function {
    /// Get the function code byte.
    #[inline]
    pub const fn code(&self) -> u8 {
        match self {
            Self::ReadVar => 0x04,
            Self::WriteVar => 0x05,
            Self::SetupCommunication => 0xF0,
        }
    }
}

/// Parsed S7 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S7Header {
    /// Message type
    pub message_type: MessageType,
    /// PDU reference
    pub pdu_ref: u16,
    /// Parameter section length
    pub param_len: u16,
    /// Data section length
    pub data_len: u16,
    /// Error class (acknowledge messages only)
    pub error_class: u8,
    /// Error code (acknowledge messages only)
    pub error_code: u8,
}

impl S7Header {
    /// Create a job request header.
    pub fn job(pdu_ref: u16, param_len: u16, data_len: u16) -> Self {
        Self {
            message_type: MessageType::Job,
            pdu_ref,
            param_len,
            data_len,
            error_class: 0,
            error_code: 0,
        }
    }

    /// Parse a header from the start of an application PDU.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < REQUEST_HEADER_LEN {
            return Err(S7Error::invalid_frame(format!(
                "S7 header too short: {} bytes",
                data.len()
            )));
        }
        if data[0] != PROTOCOL_ID {
            return Err(S7Error::invalid_frame(format!(
                "bad protocol id 0x{:02X}",
                data[0]
            )));
        }

        let message_type = MessageType::from_u8(data[1])?;
        let header_len = message_type.header_len();
        if data.len() < header_len {
            return Err(S7Error::invalid_frame(format!(
                "S7 header too short for {:?}: {} bytes",
                message_type,
                data.len()
            )));
        }

        let (error_class, error_code) = if header_len == ACK_HEADER_LEN {
            (data[10], data[11])
        } else {
            (0, 0)
        };

        Ok(Self {
            message_type,
            pdu_ref: u16::from_be_bytes([data[4], data[5]]),
            param_len: u16::from_be_bytes([data[6], data[7]]),
            data_len: u16::from_be_bytes([data[8], data[9]]),
            error_class,
            error_code,
        })
    }

    /// Encode the header.
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(PROTOCOL_ID);
        buf.put_u8(self.message_type.as_u8());
        buf.put_u16(0x0000); // reserved
        buf.put_u16(self.pdu_ref);
        buf.put_u16(self.param_len);
        buf.put_u16(self.data_len);
        if self.message_type.header_len() == ACK_HEADER_LEN {
            buf.put_u8(self.error_class);
            buf.put_u8(self.error_code);
        }
    }

    /// Header length in bytes.
    #[inline]
    pub const fn header_len(&self) -> usize {
        self.message_type.header_len()
    }

    /// Header plus parameter and data sections.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.header_len() + self.param_len as usize + self.data_len as usize
    }

    /// Error class and code, if the PLC reported one.
    pub fn error(&self) -> Option<(u8, u8)> {
        if self.error_class != 0 || self.error_code != 0 {
            Some((self.error_class, self.error_code))
        } else {
            None
        }
    }
}

/// PDU reference counter.
///
/// Incremented before use and wrapping at 16 bits, so references of
/// consecutive requests are strictly increasing modulo wraparound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PduRef(u16);

impl PduRef {
    /// Counter whose next reference is `last + 1`.
    #[inline]
    pub const fn starting_after(last: u16) -> Self {
        Self(last)
    }

    /// Advance and return the next reference.
    #[inline]
    pub fn next(&mut self) -> u16 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }

    /// Last issued reference.
    #[inline]
    pub const fn current(&self) -> u16 {
        self.0
    }
}
