//! S7 protocol type definitions.
//!
//! This module contains the protocol vocabulary shared by the codec,
//! the parser and the client:
//!
//! - `Area`, `Address`, `AreaRef` - Addressable memory
//! - TPKT/COTP constants and the connection request
//! - `S7Header`, `MessageType`, `Function`, `PduRef` - Application header
//! - `ItemSpec`, `ReturnCode`, `DataTransportSize` - Variable items
//! - `Request` - Outbound PDUs
//! - `S7DateTime` - BCD date-time

mod area;
mod cotp;
mod datetime;
mod header;
mod item;
mod pdu;

pub use area::*;
pub use cotp::*;
pub use datetime::*;
pub use header::*;
pub use item::*;
pub use pdu::*;
