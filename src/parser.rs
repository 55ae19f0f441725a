//! Response parser.
//!
//! This module turns TPKT payloads received from the controller into
//! results. Section boundaries are computed purely from the header's
//! parameter and data lengths; any response whose declared sections do not
//! fit the received bytes is rejected as malformed.

use bytes::Bytes;

use crate::error::{Result, S7Error};
use crate::types::{
    strip_data_header, DataTransportSize, Function, MessageType, ReturnCode, S7Header,
    DATA_ITEM_HEADER_LEN, SETUP_PARAM_LEN,
};

/// A validated acknowledge-with-data PDU.
#[derive(Debug, Clone, Copy)]
pub struct AckPdu<'a> {
    /// Parsed header
    pub header: S7Header,
    /// Parameter section
    pub params: &'a [u8],
    /// Data section
    pub data: &'a [u8],
}

/// Validate an acknowledge for the request `pdu_ref` / `function`.
///
/// # Example
///
/// ```rust,ignore
/// let ack = parse_ack(&payload, 3, Function::ReadVar)?;
/// println!("{} data bytes", ack.data.len());
/// ```
pub fn parse_ack(payload: &[u8], pdu_ref: u16, function: Function) -> Result<AckPdu<'_>> {
    let pdu = strip_data_header(payload)?;
    let header = S7Header::parse(pdu)?;

    match header.message_type {
        MessageType::AckData => {}
        MessageType::Ack => {
            return Err(match header.error() {
                Some((class, code)) => S7Error::Header { class, code },
                None => S7Error::invalid_frame("acknowledge without data"),
            });
        }
        other => {
            return Err(S7Error::invalid_frame(format!(
                "unexpected message type {:?}",
                other
            )));
        }
    }

    if let Some((class, code)) = header.error() {
        return Err(S7Error::Header { class, code });
    }

    if header.pdu_ref != pdu_ref {
        return Err(S7Error::invalid_frame(format!(
            "PDU reference mismatch: expected {}, got {}",
            pdu_ref, header.pdu_ref
        )));
    }

    if pdu.len() < header.total_len() {
        return Err(S7Error::invalid_frame(format!(
            "declared {} bytes, received {}",
            header.total_len(),
            pdu.len()
        )));
    }

    let param_start = header.header_len();
    let data_start = param_start + header.param_len as usize;
    let data_end = data_start + header.data_len as usize;
    let params = &pdu[param_start..data_start];
    let data = &pdu[data_start..data_end];

    match params.first() {
        Some(&code) if code == function.code() => {}
        Some(&code) => {
            return Err(S7Error::invalid_frame(format!(
                "expected function 0x{:02X}, got 0x{:02X}",
                function.code(),
                code
            )));
        }
        None => return Err(S7Error::invalid_frame("missing parameter section")),
    }

    Ok(AckPdu {
        header,
        params,
        data,
    })
}

/// Parse a setup communication reply and return the negotiated PDU size.
pub fn parse_setup_response(payload: &[u8], pdu_ref: u16) -> Result<u16> {
    let ack = parse_ack(payload, pdu_ref, Function::SetupCommunication)?;
    if ack.params.len() < SETUP_PARAM_LEN {
        return Err(S7Error::invalid_frame("setup parameters too short"));
    }

    let pdu_size = u16::from_be_bytes([ack.params[6], ack.params[7]]);
    if pdu_size == 0 {
        return Err(S7Error::handshake("controller proposed PDU size 0"));
    }
    Ok(pdu_size)
}

/// Parse a read-variable reply.
///
/// Returns at most `requested` bytes, further capped by the item's declared
/// length and the bytes actually present.
pub fn parse_read_response(payload: &[u8], pdu_ref: u16, requested: usize) -> Result<Bytes> {
    let ack = parse_ack(payload, pdu_ref, Function::ReadVar)?;
    check_item_count(ack.params)?;

    let data = ack.data;
    let code = match data.first() {
        Some(&byte) => ReturnCode::from_u8(byte),
        None => return Err(S7Error::invalid_frame("missing data section")),
    };
    if !code.is_read_success() {
        return Err(S7Error::Item(code));
    }

    if data.len() < DATA_ITEM_HEADER_LEN {
        return Err(S7Error::invalid_frame("data item header too short"));
    }

    let transport = DataTransportSize::from_u8(data[1]);
    let declared = transport.byte_count(u16::from_be_bytes([data[2], data[3]]));
    let available = data.len() - DATA_ITEM_HEADER_LEN;
    let count = declared.min(requested).min(available);
    if count == 0 {
        return Err(S7Error::invalid_frame("read reply carries no data"));
    }

    Ok(Bytes::copy_from_slice(
        &data[DATA_ITEM_HEADER_LEN..DATA_ITEM_HEADER_LEN + count],
    ))
}

/// Parse a write-variable reply.
pub fn parse_write_response(payload: &[u8], pdu_ref: u16) -> Result<()> {
    let ack = parse_ack(payload, pdu_ref, Function::WriteVar)?;
    check_item_count(ack.params)?;

    match ack.data.first().map(|&byte| ReturnCode::from_u8(byte)) {
        Some(ReturnCode::Success) => Ok(()),
        Some(code) => Err(S7Error::Item(code)),
        None => Err(S7Error::invalid_frame("missing data section")),
    }
}

fn check_item_count(params: &[u8]) -> Result<()> {
    match params.get(1) {
        Some(1) => Ok(()),
        Some(count) => Err(S7Error::invalid_frame(format!(
            "expected 1 item, got {}",
            count
        ))),
        None => Err(S7Error::invalid_frame("missing item count")),
    }
}
