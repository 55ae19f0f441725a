//! # voltage_s7
//!
//! Siemens S7 (ISO-on-TCP) PLC client for Rust.
//!
//! This crate reads and writes controller memory (process inputs,
//! outputs, flags and data blocks) over the S7 communication protocol
//! carried in ISO-on-TCP frames, as spoken by S7-300/400/1200/1500 CPUs.
//!
//! ## Features
//!
//! - **Async**: Built on tokio, one request in flight per session
//! - **Chunked transfers**: Large reads and writes are split to fit the negotiated PDU size
//! - **Typed access**: BOOL, BYTE, WORD, INT, DWORD, DINT, REAL, LREAL, STRING, DATE_AND_TIME, arrays
//! - **Pluggable logging**: Progress and diagnostics go to a [`LogSink`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voltage_s7::{Address, ClientConfig, S7Client};
//!
//! #[tokio::main]
//! async fn main() -> voltage_s7::Result<()> {
//!     let config = ClientConfig::new("192.168.0.1").rack(0).slot(1);
//!     let client = S7Client::new(config);
//!
//!     // TCP, COTP connection, communication setup
//!     client.connect().await?;
//!
//!     let speed = client.read_real(Address::db(10, 4)).await?;
//!     client.write_bit(Address::flags(0), 3, true).await?;
//!     let block = client.read_db(10, 0, 1024).await?;
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol Overview
//!
//! Every message is nested in three layers:
//!
//! ```text
//! +------+------+--------+   +-----+------+-----+   +------+------+-----+---------+--------+
//! | 0x03 | 0x00 | Length |   | 0x02| 0xF0 | 0x80|   | 0x32 | Type | ... | Params  | Data   |
//! +------+------+--------+   +-----+------+-----+   +------+------+-----+---------+--------+
//!    TPKT (4 bytes)            COTP data (3 bytes)    S7 header (10/12 bytes) + sections
//! ```
//!
//! The connection is set up with a COTP connection request carrying the
//! rack/slot TSAP, followed by an S7 setup-communication job that
//! negotiates the PDU size.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod codec;
pub mod data;
pub mod error;
pub mod parser;
pub mod sink;
pub mod typed;
pub mod types;

// Re-export main types
pub use client::{ClientConfig, S7Client, SessionState, Transport};
pub use codec::TpktCodec;
pub use error::{Result, S7Error};
pub use sink::{LogSink, NullSink, SharedSink, TracingSink};
pub use typed::DEFAULT_STRING_LEN;
pub use types::*;
