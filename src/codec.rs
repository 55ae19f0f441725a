//! TPKT codec for tokio.
//!
//! This module provides a codec implementation for framing ISO-on-TCP
//! (RFC 1006) packets using the tokio-util codec framework. Decoded items
//! are TPKT payloads, i.e. the COTP PDU with everything that follows it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::S7Error;
use crate::types::{MAX_TPKT_LENGTH, TPKT_HEADER_LEN, TPKT_VERSION};

/// Smallest TPKT length that can hold a COTP PDU.
const MIN_TPKT_LENGTH: usize = TPKT_HEADER_LEN + 2;

/// TPKT codec.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_util::codec::Framed;
/// use voltage_s7::codec::TpktCodec;
///
/// let stream = TcpStream::connect("192.168.0.1:102").await?;
/// let mut framed = Framed::new(stream, TpktCodec::new());
///
/// framed.send(Request::setup(960).encode(1)).await?;
/// let payload = framed.next().await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TpktCodec {
    state: DecodeState,
}

#[derive(Debug, Clone, Copy, Default)]
enum DecodeState {
    #[default]
    Header,
    Payload {
        length: usize,
    },
}

impl TpktCodec {
    /// Create a new TPKT codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for TpktCodec {
    type Item = Bytes;
    type Error = S7Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < TPKT_HEADER_LEN {
                        return Ok(None);
                    }

                    // A wrong version means we lost frame sync; there is no
                    // start marker to resynchronise on.
                    if src[0] != TPKT_VERSION {
                        return Err(S7Error::Framing(format!(
                            "bad TPKT version 0x{:02X}",
                            src[0]
                        )));
                    }

                    let length = u16::from_be_bytes([src[2], src[3]]) as usize;
                    if length < MIN_TPKT_LENGTH {
                        return Err(S7Error::Framing(format!(
                            "TPKT length {} too small",
                            length
                        )));
                    }

                    src.reserve(length.saturating_sub(src.len()));
                    self.state = DecodeState::Payload { length };
                }

                DecodeState::Payload { length } => {
                    if src.len() < length {
                        return Ok(None);
                    }

                    let mut frame = src.split_to(length);
                    frame.advance(TPKT_HEADER_LEN);
                    self.state = DecodeState::Header;
                    return Ok(Some(frame.freeze()));
                }
            }
        }
    }
}

impl Encoder<Bytes> for TpktCodec {
    type Error = S7Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let length = TPKT_HEADER_LEN + item.len();
        if length > MAX_TPKT_LENGTH {
            return Err(S7Error::invalid_argument(format!(
                "frame of {} bytes exceeds TPKT limit",
                length
            )));
        }

        dst.reserve(length);
        dst.put_u8(TPKT_VERSION);
        dst.put_u8(0x00);
        dst.put_u16(length as u16);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
