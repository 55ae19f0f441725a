//! S7 client implementation.
//!
//! This module provides an asynchronous client for reading and writing
//! controller memory over ISO-on-TCP. A client owns at most one session;
//! every exchange on it (including whole chunked transfers) runs under a
//! single lock, because the protocol is strictly one request, one reply.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::TpktCodec;
use crate::error::{Result, S7Error};
use crate::parser::{parse_read_response, parse_setup_response, parse_write_response};
use crate::sink::{SharedSink, TracingSink};
use crate::types::{
    parse_connection_confirm, Address, Area, AreaRef, ConnectionRequest, PduRef, Request,
    MAX_WRITE_BYTES,
};

/// ISO-on-TCP port.
pub const DEFAULT_PORT: u16 = 102;

/// Default rack of the CPU.
pub const DEFAULT_RACK: u8 = 0;

/// Default slot of the CPU.
pub const DEFAULT_SLOT: u8 = 2;

/// PDU size assumed until negotiation replaces it.
pub const DEFAULT_PDU_SIZE: u16 = 240;

/// PDU size proposed during communication setup.
pub const DEFAULT_REQUESTED_PDU_SIZE: u16 = 960;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default response timeout in seconds.
pub const DEFAULT_RESPONSE_TIMEOUT: u64 = 10;

/// Lower bound of the per-request chunk length.
pub const MIN_CHUNK_LEN: usize = 200;

/// Protocol overhead subtracted from the PDU size for reads.
pub const READ_OVERHEAD: usize = 20;

/// Protocol overhead subtracted from the PDU size for writes.
pub const WRITE_OVERHEAD: usize = 30;

/// Largest number of bytes read by a single request.
#[inline]
pub fn max_read_len(pdu_size: u16) -> usize {
    (pdu_size as usize)
        .saturating_sub(READ_OVERHEAD)
        .max(MIN_CHUNK_LEN)
}

/// Largest number of bytes written by a single request.
#[inline]
pub fn max_write_len(pdu_size: u16) -> usize {
    (pdu_size as usize)
        .saturating_sub(WRITE_OVERHEAD)
        .max(MIN_CHUNK_LEN)
        .min(MAX_WRITE_BYTES)
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// PLC address: host or IP, optionally with `:port`
    pub address: String,
    /// Rack of the CPU
    pub rack: u8,
    /// Slot of the CPU
    pub slot: u8,
    /// Port used when `address` carries none
    pub port: u16,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Time to wait for each reply
    pub response_timeout: Duration,
    /// PDU size proposed to the controller
    pub requested_pdu_size: u16,
}

impl ClientConfig {
    /// Create a new configuration with the given address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            rack: DEFAULT_RACK,
            slot: DEFAULT_SLOT,
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT),
            requested_pdu_size: DEFAULT_REQUESTED_PDU_SIZE,
        }
    }

    /// Set rack.
    pub fn rack(mut self, rack: u8) -> Self {
        self.rack = rack;
        self
    }

    /// Set slot.
    pub fn slot(mut self, slot: u8) -> Self {
        self.slot = slot;
        self
    }

    /// Set port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set response timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the PDU size proposed during setup.
    pub fn requested_pdu_size(mut self, pdu_size: u16) -> Self {
        self.requested_pdu_size = pdu_size;
        self
    }

    /// Address to dial, with the port filled in when missing.
    pub fn socket_addr(&self) -> String {
        if self.address.parse::<SocketAddr>().is_ok() {
            return self.address.clone();
        }
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.port).to_string();
        }
        if self.address.contains(':') {
            self.address.clone()
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable connection
    Disconnected,
    /// COTP connection confirmed, communication not yet set up
    TransportConnected,
    /// PDU size negotiated, ready for reads and writes
    Negotiated,
}

/// Byte stream a session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// One connection to a controller.
struct Session {
    framed: Framed<Box<dyn Transport>, TpktCodec>,
    state: SessionState,
    pdu_size: u16,
    pdu_ref: PduRef,
    response_timeout: Duration,
    cancel: CancellationToken,
    sink: SharedSink,
}

impl Session {
    fn new(
        transport: Box<dyn Transport>,
        response_timeout: Duration,
        cancel: CancellationToken,
        sink: SharedSink,
    ) -> Self {
        Self {
            framed: Framed::new(transport, TpktCodec::new()),
            state: SessionState::Disconnected,
            pdu_size: DEFAULT_PDU_SIZE,
            pdu_ref: PduRef::default(),
            response_timeout,
            cancel,
            sink,
        }
    }

    fn log(&self, message: &str) {
        self.sink.log(message);
    }

    fn fail(&self, context: &str, err: S7Error) -> S7Error {
        tracing::warn!(error = %err, "{}", context);
        self.log(&format!("{} failed: {}", context, err));
        err
    }

    /// Send one frame and wait for its reply.
    ///
    /// Aborts with `S7Error::Aborted` as soon as the session is cancelled.
    async fn exchange(&mut self, payload: Bytes) -> Result<Bytes> {
        let cancel = self.cancel.clone();
        let response_timeout = self.response_timeout;
        let framed = &mut self.framed;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(S7Error::Aborted),
            result = transact(framed, payload, response_timeout) => result,
        }
    }

    async fn connect_transport(&mut self, rack: u8, slot: u8) -> Result<()> {
        let request = ConnectionRequest::for_rack_slot(rack, slot);
        let mut buf = BytesMut::with_capacity(request.encoded_len());
        request.encode_to(&mut buf);

        self.log(&format!(
            "Sending COTP connection request (rack {}, slot {})",
            rack, slot
        ));
        let reply = self.exchange(buf.freeze()).await?;
        parse_connection_confirm(&reply)?;

        self.state = SessionState::TransportConnected;
        self.log("COTP connection confirmed");
        Ok(())
    }

    async fn setup_communication(&mut self, requested_pdu_size: u16) -> Result<()> {
        let pdu_ref = self.pdu_ref.next();
        self.log(&format!(
            "Sending communication setup (proposed PDU size {})",
            requested_pdu_size
        ));
        let reply = self
            .exchange(Request::setup(requested_pdu_size).encode(pdu_ref))
            .await?;

        let pdu_size = parse_setup_response(&reply, pdu_ref).map_err(|e| match e {
            e if e.is_connection_error() => e,
            S7Error::Handshake(_) => e,
            other => S7Error::handshake(format!("communication setup rejected: {}", other)),
        })?;

        self.pdu_size = pdu_size;
        self.state = SessionState::Negotiated;
        tracing::debug!(pdu_size, "communication setup complete");
        self.log(&format!("Negotiated PDU size: {}", pdu_size));
        Ok(())
    }

    fn ensure_negotiated(&self) -> Result<()> {
        if self.state == SessionState::Negotiated {
            Ok(())
        } else {
            Err(S7Error::NotConnected)
        }
    }

    async fn read_once(&mut self, range: AreaRef) -> Result<Bytes> {
        let request = Request::read(range)?;
        let pdu_ref = self.pdu_ref.next();
        tracing::debug!(pdu_ref, %request, "sending read request");
        self.log(&format!(
            "Read request: area {}, DB {}, offset {}, length {}",
            range.area, range.db_number, range.offset, range.length
        ));

        let reply = self.exchange(request.encode(pdu_ref)).await?;
        let data = parse_read_response(&reply, pdu_ref, range.length)?;
        self.log(&format!("Read {} bytes", data.len()));
        Ok(data)
    }

    async fn write_once(&mut self, range: AreaRef, data: Bytes) -> Result<()> {
        let request = Request::write(range, data)?;
        let pdu_ref = self.pdu_ref.next();
        tracing::debug!(pdu_ref, %request, "sending write request");
        self.log(&format!(
            "Write request: area {}, DB {}, offset {}, length {}",
            range.area, range.db_number, range.offset, range.length
        ));

        let reply = self.exchange(request.encode(pdu_ref)).await?;
        parse_write_response(&reply, pdu_ref)?;
        self.log("Write succeeded");
        Ok(())
    }

    /// Read a byte range, splitting it into chunks when needed.
    async fn read(&mut self, range: AreaRef) -> Result<Bytes> {
        self.ensure_negotiated()?;
        range.validate()?;

        let max = max_read_len(self.pdu_size);
        if range.length <= max {
            return match self.read_once(range).await {
                Ok(data) => Ok(data),
                Err(e) => Err(self.fail("Read", e)),
            };
        }

        self.log(&format!(
            "Chunked read: {} bytes, PDU size {}",
            range.length, self.pdu_size
        ));

        let mut out = BytesMut::with_capacity(range.length);
        let mut offset = range.offset;
        let mut remaining = range.length;
        while remaining > 0 {
            let len = remaining.min(max);
            self.log(&format!("Reading chunk: offset {}, length {}", offset, len));

            let chunk = match self
                .read_once(AreaRef::new(range.area, range.db_number, offset, len))
                .await
            {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.fail(&format!("Chunk read at offset {}", offset), e)),
            };
            if chunk.len() != len {
                let err = S7Error::ShortRead {
                    expected: len,
                    actual: chunk.len(),
                };
                return Err(self.fail(&format!("Chunk read at offset {}", offset), err));
            }

            out.extend_from_slice(&chunk);
            offset += len as u32;
            remaining -= len;
        }

        self.log(&format!("Chunked read complete: {} bytes", out.len()));
        Ok(out.freeze())
    }

    /// Write bytes starting at `address`, splitting them into chunks when needed.
    ///
    /// Chunks written before a failing chunk stay applied.
    async fn write(&mut self, address: Address, data: Bytes) -> Result<()> {
        self.ensure_negotiated()?;
        let range = address.span(data.len());
        range.validate()?;

        let max = max_write_len(self.pdu_size);
        if data.len() <= max {
            return match self.write_once(range, data).await {
                Ok(()) => Ok(()),
                Err(e) => Err(self.fail("Write", e)),
            };
        }

        self.log(&format!(
            "Chunked write: {} bytes, PDU size {}",
            data.len(),
            self.pdu_size
        ));

        let mut pos = 0;
        while pos < data.len() {
            let len = (data.len() - pos).min(max);
            let chunk_address = address.advance(pos as u32);
            self.log(&format!(
                "Writing chunk: offset {}, length {}",
                chunk_address.offset, len
            ));

            if let Err(e) = self
                .write_once(chunk_address.span(len), data.slice(pos..pos + len))
                .await
            {
                return Err(self.fail(
                    &format!("Chunk write at offset {}", chunk_address.offset),
                    e,
                ));
            }
            pos += len;
        }

        self.log(&format!("Chunked write complete: {} bytes", data.len()));
        Ok(())
    }

    /// Read one byte, transform it and write it back.
    async fn update_byte<F>(&mut self, address: Address, update: F) -> Result<u8>
    where
        F: FnOnce(u8) -> u8,
    {
        let current = self.read(address.span(1)).await?;
        let byte = current.first().copied().ok_or(S7Error::ShortRead {
            expected: 1,
            actual: 0,
        })?;
        let updated = update(byte);
        self.write(address, Bytes::copy_from_slice(&[updated])).await?;
        Ok(updated)
    }

    async fn close(mut self) {
        let _ = timeout(
            self.response_timeout,
            SinkExt::<Bytes>::close(&mut self.framed),
        )
        .await;
        self.state = SessionState::Disconnected;
    }
}

async fn transact(
    framed: &mut Framed<Box<dyn Transport>, TpktCodec>,
    payload: Bytes,
    response_timeout: Duration,
) -> Result<Bytes> {
    tracing::trace!("tx {:02X?}", &payload[..]);
    framed.send(payload).await?;

    match timeout(response_timeout, framed.next()).await {
        Ok(Some(Ok(reply))) => {
            tracing::trace!("rx {:02X?}", &reply[..]);
            Ok(reply)
        }
        Ok(Some(Err(e))) => Err(e),
        Ok(None) => Err(S7Error::Connection("connection closed by peer".into())),
        Err(_) => Err(S7Error::ResponseTimeout),
    }
}

/// S7 client.
///
/// All operations take `&self`; share the client through an `Arc` to run
/// long transfers on a worker task. Concurrent callers queue on the
/// session lock.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use voltage_s7::{Address, ClientConfig, S7Client};
///
/// let client = Arc::new(S7Client::new(ClientConfig::new("192.168.0.1").rack(0).slot(1)));
/// client.connect().await?;
///
/// let worker = client.clone();
/// let block = tokio::spawn(async move { worker.read_db(10, 0, 2048).await });
///
/// let speed = client.read_real(Address::db(10, 4)).await?;
/// let block = block.await??;
/// ```
pub struct S7Client {
    config: ClientConfig,
    sink: SharedSink,
    session: Mutex<Option<Session>>,
    abort: StdMutex<CancellationToken>,
}

impl S7Client {
    /// Create a client that logs through `tracing`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a client reporting diagnostics to `sink`.
    pub fn with_sink(config: ClientConfig, sink: SharedSink) -> Self {
        Self {
            config,
            sink,
            session: Mutex::new(None),
            abort: StdMutex::new(CancellationToken::new()),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the current session state.
    ///
    /// Waits for any in-flight exchange to finish.
    pub async fn state(&self) -> SessionState {
        match self.session.lock().await.as_ref() {
            Some(session) => session.state,
            None => SessionState::Disconnected,
        }
    }

    /// Check whether the client is ready for reads and writes.
    pub async fn is_connected(&self) -> bool {
        self.state().await == SessionState::Negotiated
    }

    /// Negotiated PDU size, if connected.
    pub async fn pdu_size(&self) -> Option<u16> {
        self.session.lock().await.as_ref().map(|s| s.pdu_size)
    }

    /// Largest single read for the negotiated PDU size, if connected.
    pub async fn max_read_len(&self) -> Option<usize> {
        self.pdu_size().await.map(max_read_len)
    }

    /// Largest single write for the negotiated PDU size, if connected.
    pub async fn max_write_len(&self) -> Option<usize> {
        self.pdu_size().await.map(max_write_len)
    }

    /// Connect over TCP and run the handshake.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Err(S7Error::AlreadyConnected);
        }

        let addr = self.config.socket_addr();
        let connecting = TcpStream::connect(addr.as_str());
        let stream = match timeout(self.config.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let err = S7Error::Connection(format!("{}: {}", addr, e));
                self.sink.log(&format!("Connection failed: {}", err));
                return Err(err);
            }
            Err(_) => {
                self.sink
                    .log(&format!("Connection failed: {}", S7Error::ConnectionTimeout));
                return Err(S7Error::ConnectionTimeout);
            }
        };

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true).ok();
        self.sink.log(&format!("TCP connection established: {}", addr));

        *guard = Some(self.handshake(Box::new(stream)).await?);
        self.sink.log(&format!("Connected to PLC {}", addr));
        Ok(())
    }

    /// Run the handshake over an already open transport.
    ///
    /// Used for tunnels and in-process test peers; `connect` ends up here
    /// after opening TCP.
    pub async fn connect_with<T>(&self, transport: T) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Err(S7Error::AlreadyConnected);
        }

        *guard = Some(self.handshake(Box::new(transport)).await?);
        self.sink.log("Connected to PLC");
        Ok(())
    }

    async fn handshake(&self, transport: Box<dyn Transport>) -> Result<Session> {
        let cancel = CancellationToken::new();
        *self.abort_token() = cancel.clone();

        let mut session = Session::new(
            transport,
            self.config.response_timeout,
            cancel,
            self.sink.clone(),
        );

        let result = async {
            session
                .connect_transport(self.config.rack, self.config.slot)
                .await?;
            session
                .setup_communication(self.config.requested_pdu_size)
                .await
        }
        .await;

        match result {
            Ok(()) => Ok(session),
            Err(e) => {
                self.sink.log(&format!("Connection failed: {}", e));
                session.close().await;
                Err(e)
            }
        }
    }

    /// Close the connection.
    ///
    /// Interrupts any in-flight exchange, which then fails with
    /// `S7Error::Aborted`. Safe to call in any state, any number of times.
    pub async fn disconnect(&self) {
        self.abort_token().cancel();

        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            session.close().await;
            self.sink.log("Disconnected");
        }
    }

    fn abort_token(&self) -> StdMutexGuard<'_, CancellationToken> {
        self.abort.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the session after errors that leave it unusable.
    fn settle<T>(&self, session: &mut Option<Session>, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connection_error() && session.take().is_some() {
                tracing::warn!(error = %e, "dropping session");
                self.sink.log(&format!("Connection lost: {}", e));
            }
        }
        result
    }

    /// Read a byte range.
    pub async fn read(&self, range: AreaRef) -> Result<Bytes> {
        let mut guard = self.session.lock().await;
        let result = match guard.as_mut() {
            Some(session) => session.read(range).await,
            None => Err(S7Error::NotConnected),
        };
        self.settle(&mut guard, result)
    }

    /// Write bytes starting at `address`.
    ///
    /// Transfers larger than one PDU are split; if a later chunk fails, the
    /// chunks before it remain written.
    pub async fn write(&self, address: Address, data: Bytes) -> Result<()> {
        let mut guard = self.session.lock().await;
        let result = match guard.as_mut() {
            Some(session) => session.write(address, data).await,
            None => Err(S7Error::NotConnected),
        };
        self.settle(&mut guard, result)
    }

    /// Read-modify-write one byte under a single hold of the session lock.
    ///
    /// Other callers of this client cannot interleave, but the controller
    /// itself may change the byte between the read and the write.
    pub async fn update_byte<F>(&self, address: Address, update: F) -> Result<u8>
    where
        F: FnOnce(u8) -> u8,
    {
        let mut guard = self.session.lock().await;
        let result = match guard.as_mut() {
            Some(session) => session.update_byte(address, update).await,
            None => Err(S7Error::NotConnected),
        };
        self.settle(&mut guard, result)
    }

    /// Read `length` bytes from any area.
    pub async fn read_area(
        &self,
        area: Area,
        db_number: u16,
        offset: u32,
        length: usize,
    ) -> Result<Bytes> {
        self.read(AreaRef::new(area, db_number, offset, length))
            .await
    }

    /// Write `data` to any area.
    pub async fn write_area(
        &self,
        area: Area,
        db_number: u16,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.write(
            Address::new(area, db_number, offset),
            Bytes::copy_from_slice(data),
        )
        .await
    }

    /// Read from a data block.
    pub async fn read_db(&self, db_number: u16, offset: u32, length: usize) -> Result<Bytes> {
        self.read(Address::db(db_number, offset).span(length)).await
    }

    /// Write to a data block.
    pub async fn write_db(&self, db_number: u16, offset: u32, data: &[u8]) -> Result<()> {
        self.write_area(Area::DataBlock, db_number, offset, data)
            .await
    }

    /// Read process inputs.
    pub async fn read_inputs(&self, offset: u32, length: usize) -> Result<Bytes> {
        self.read(Address::input(offset).span(length)).await
    }

    /// Read process outputs.
    pub async fn read_outputs(&self, offset: u32, length: usize) -> Result<Bytes> {
        self.read(Address::output(offset).span(length)).await
    }

    /// Write process outputs.
    pub async fn write_outputs(&self, offset: u32, data: &[u8]) -> Result<()> {
        self.write_area(Area::Output, 0, offset, data).await
    }

    /// Read flag memory.
    pub async fn read_flags(&self, offset: u32, length: usize) -> Result<Bytes> {
        self.read(Address::flags(offset).span(length)).await
    }

    /// Write flag memory.
    pub async fn write_flags(&self, offset: u32, data: &[u8]) -> Result<()> {
        self.write_area(Area::Flags, 0, offset, data).await
    }
}
