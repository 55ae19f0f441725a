//! ISO transport layer: TPKT framing constants and COTP PDUs.
//!
//! ```text
//! TPKT (4 bytes):
//! +--------+--------+--------+--------+
//! | 0x03   | 0x00   | Length (BE)     |
//! +--------+--------+--------+--------+
//!
//! COTP data header (3 bytes):
//! +--------+--------+--------+
//! | 0x02   | 0xF0   | 0x80   |
//! +--------+--------+--------+
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{Result, S7Error};

/// TPKT version byte.
pub const TPKT_VERSION: u8 = 0x03;

/// TPKT header length (version, reserved, 16-bit length).
pub const TPKT_HEADER_LEN: usize = 4;

/// Largest frame the 16-bit TPKT length can describe.
pub const MAX_TPKT_LENGTH: usize = u16::MAX as usize;

/// COTP connection request PDU type.
pub const COTP_CONNECTION_REQUEST: u8 = 0xE0;

/// COTP connection confirm PDU type.
pub const COTP_CONNECTION_CONFIRM: u8 = 0xD0;

/// COTP data transfer PDU type.
pub const COTP_DATA: u8 = 0xF0;

/// COTP data header prepended to every application PDU.
pub const COTP_DATA_HEADER: [u8; 3] = [0x02, COTP_DATA, 0x80];

/// Local TSAP announced in the connection request.
pub const LOCAL_TSAP: u16 = 0x0100;

/// TPDU size parameter value for 1024-byte TPDUs.
const TPDU_SIZE_1024: u8 = 0x0A;

const PARAM_TPDU_SIZE: u8 = 0xC0;
const PARAM_SRC_TSAP: u8 = 0xC1;
const PARAM_DST_TSAP: u8 = 0xC2;

/// Compute the remote TSAP low byte from rack and slot.
///
/// `(rack << 5) | (slot & 0x1F)`, truncated to a byte.
#[inline]
pub const fn remote_tsap(rack: u8, slot: u8) -> u8 {
    (((rack as u16) << 5) as u8) | (slot & 0x1F)
}

/// COTP connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Destination reference
    pub dst_ref: u16,
    /// Source reference
    pub src_ref: u16,
    /// Calling TSAP
    pub src_tsap: u16,
    /// Called TSAP
    pub dst_tsap: u16,
}

impl ConnectionRequest {
    /// Connection request addressing the CPU at `rack`/`slot`.
    pub fn for_rack_slot(rack: u8, slot: u8) -> Self {
        Self {
            dst_ref: 0x0000,
            src_ref: 0x0001,
            src_tsap: LOCAL_TSAP,
            dst_tsap: 0x0100 | remote_tsap(rack, slot) as u16,
        }
    }

    /// Encode the COTP PDU (without TPKT header).
    pub fn encode_to(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_u8(0); // length indicator, patched below
        buf.put_u8(COTP_CONNECTION_REQUEST);
        buf.put_u16(self.dst_ref);
        buf.put_u16(self.src_ref);
        buf.put_u8(0x00); // class 0

        buf.put_slice(&[PARAM_TPDU_SIZE, 0x01, TPDU_SIZE_1024]);
        buf.put_slice(&[PARAM_SRC_TSAP, 0x02]);
        buf.put_u16(self.src_tsap);
        buf.put_slice(&[PARAM_DST_TSAP, 0x02]);
        buf.put_u16(self.dst_tsap);

        // Length indicator excludes itself
        buf[start] = (buf.len() - start - 1) as u8;
    }

    /// Encoded length in bytes.
    #[inline]
    pub const fn encoded_len(&self) -> usize {
        18
    }
}

/// Validate a COTP connection confirm.
///
/// `payload` starts at the COTP length indicator, i.e. directly after the
/// TPKT header; the PDU type sits at frame byte 5.
pub fn parse_connection_confirm(payload: &[u8]) -> Result<()> {
    if payload.len() < 2 {
        return Err(S7Error::handshake("connection confirm too short"));
    }
    match payload[1] {
        COTP_CONNECTION_CONFIRM => Ok(()),
        other => Err(S7Error::handshake(format!(
            "expected connection confirm (0xD0), got PDU type 0x{:02X}",
            other
        ))),
    }
}

/// Strip the COTP data header and return the application PDU.
pub fn strip_data_header(payload: &[u8]) -> Result<&[u8]> {
    if payload.len() < COTP_DATA_HEADER.len() {
        return Err(S7Error::invalid_frame("COTP data header too short"));
    }
    if payload[1] != COTP_DATA {
        return Err(S7Error::invalid_frame(format!(
            "expected COTP data PDU (0xF0), got 0x{:02X}",
            payload[1]
        )));
    }
    let header_len = payload[0] as usize + 1;
    if payload.len() < header_len {
        return Err(S7Error::invalid_frame("COTP header length exceeds frame"));
    }
    Ok(&payload[header_len..])
}
