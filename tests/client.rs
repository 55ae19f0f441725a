//! Client tests against an in-process mock PLC.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

use voltage_s7::{
    Address, Area, ClientConfig, ReturnCode, S7Client, S7DateTime, S7Error, SessionState,
    SharedSink, TpktCodec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Recorded {
    op: Op,
    area: u8,
    db: u16,
    offset: u32,
    length: usize,
}

/// Minimal controller: answers the handshake, then serves reads and
/// writes from an in-memory image.
#[derive(Clone)]
struct MockPlc {
    pdu_size: u16,
    confirm_type: u8,
    /// Reply to the n-th read/write request with this return code
    fail_at: Option<(usize, u8)>,
    /// Never answer reads or writes
    silent: bool,
    /// Answer reads with "success, truncated" and at most this many bytes
    truncate_reads: Option<usize>,
    memory: Arc<Mutex<HashMap<(u8, u16), Vec<u8>>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

const MEMORY_SIZE: usize = 4096;

impl MockPlc {
    fn new(pdu_size: u16) -> Self {
        Self {
            pdu_size,
            confirm_type: 0xD0,
            fail_at: None,
            silent: false,
            truncate_reads: None,
            memory: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn fail_at(mut self, index: usize, code: u8) -> Self {
        self.fail_at = Some((index, code));
        self
    }

    fn confirm_type(mut self, byte: u8) -> Self {
        self.confirm_type = byte;
        self
    }

    fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    fn truncate_reads(mut self, max: usize) -> Self {
        self.truncate_reads = Some(max);
        self
    }

    fn fill(&self, area: Area, db: u16, offset: usize, data: &[u8]) {
        let mut memory = self.memory.lock().unwrap();
        let block = memory
            .entry((area.code(), db))
            .or_insert_with(|| vec![0; MEMORY_SIZE]);
        block[offset..offset + data.len()].copy_from_slice(data);
    }

    fn dump(&self, area: Area, db: u16, offset: usize, len: usize) -> Vec<u8> {
        let mut memory = self.memory.lock().unwrap();
        let block = memory
            .entry((area.code(), db))
            .or_insert_with(|| vec![0; MEMORY_SIZE]);
        block[offset..offset + len].to_vec()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    async fn serve(self, io: DuplexStream) {
        let mut framed = Framed::new(io, TpktCodec::new());

        let request = match framed.next().await {
            Some(Ok(frame)) => frame,
            _ => return,
        };
        assert_eq!(request[1], 0xE0, "expected COTP connection request");
        let mut confirm = request.to_vec();
        confirm[1] = self.confirm_type;
        if framed.send(Bytes::from(confirm)).await.is_err() {
            return;
        }

        let mut served = 0;
        while let Some(Ok(frame)) = framed.next().await {
            let s7 = &frame[3..];
            let pdu_ref = u16::from_be_bytes([s7[4], s7[5]]);
            let function = s7[10];

            let reply = match function {
                0xF0 => {
                    let mut params = vec![0xF0, 0x00, 0x00, 0x01, 0x00, 0x01];
                    params.extend_from_slice(&self.pdu_size.to_be_bytes());
                    ack_data(pdu_ref, &params, &[])
                }
                0x04 | 0x05 => {
                    let item = &s7[12..24];
                    let length = u16::from_be_bytes([item[4], item[5]]) as usize;
                    let db = u16::from_be_bytes([item[6], item[7]]);
                    let area = item[8];
                    let offset = u32::from_be_bytes([0, item[9], item[10], item[11]]) / 8;
                    let op = if function == 0x04 { Op::Read } else { Op::Write };
                    self.requests.lock().unwrap().push(Recorded {
                        op,
                        area,
                        db,
                        offset,
                        length,
                    });

                    let index = served;
                    served += 1;
                    if self.silent {
                        continue;
                    }
                    let failure = self
                        .fail_at
                        .filter(|(at, _)| *at == index)
                        .map(|(_, code)| code);

                    self.data_reply(function, pdu_ref, area, db, offset as usize, length, s7, failure)
                }
                other => panic!("unexpected function 0x{:02X}", other),
            };

            if framed.send(reply).await.is_err() {
                return;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn data_reply(
        &self,
        function: u8,
        pdu_ref: u16,
        area: u8,
        db: u16,
        offset: usize,
        length: usize,
        s7: &[u8],
        failure: Option<u8>,
    ) -> Bytes {
        let mut memory = self.memory.lock().unwrap();
        let block = memory
            .entry((area, db))
            .or_insert_with(|| vec![0; MEMORY_SIZE]);

        if function == 0x04 {
            let data = match failure {
                Some(code) => vec![code, 0x00, 0x00, 0x00],
                None => {
                    let (code, count) = match self.truncate_reads {
                        Some(max) if max < length => (0x04, max),
                        _ => (0xFF, length),
                    };
                    let mut data = vec![code, 0x04];
                    data.extend_from_slice(&((count * 8) as u16).to_be_bytes());
                    data.extend_from_slice(&block[offset..offset + count]);
                    data
                }
            };
            ack_data(pdu_ref, &[0x04, 0x01], &data)
        } else {
            let code = match failure {
                Some(code) => code,
                None => {
                    block[offset..offset + length].copy_from_slice(&s7[28..28 + length]);
                    0xFF
                }
            };
            ack_data(pdu_ref, &[0x05, 0x01], &[code])
        }
    }
}

fn ack_data(pdu_ref: u16, params: &[u8], data: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0x02, 0xF0, 0x80, 0x32, 0x03, 0x00, 0x00]);
    buf.put_u16(pdu_ref);
    buf.put_u16(params.len() as u16);
    buf.put_u16(data.len() as u16);
    buf.put_u8(0x00);
    buf.put_u8(0x00);
    buf.extend_from_slice(params);
    buf.extend_from_slice(data);
    buf.freeze()
}

fn config() -> ClientConfig {
    ClientConfig::new("mock-plc").response_timeout(Duration::from_secs(2))
}

async fn connect(plc: &MockPlc, config: ClientConfig) -> S7Client {
    let client = S7Client::with_sink(config, Arc::new(voltage_s7::NullSink));
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(plc.clone().serve(server_io));
    client.connect_with(client_io).await.unwrap();
    client
}

#[tokio::test]
async fn test_connect_negotiates_pdu_size() {
    let plc = MockPlc::new(480);
    let client = connect(&plc, config()).await;

    assert_eq!(client.state().await, SessionState::Negotiated);
    assert_eq!(client.pdu_size().await, Some(480));
    assert_eq!(client.max_read_len().await, Some(460));
    assert_eq!(client.max_write_len().await, Some(450));

    client.disconnect().await;
    assert_eq!(client.pdu_size().await, None);
}

#[tokio::test]
async fn test_handshake_rejected() {
    let plc = MockPlc::new(240).confirm_type(0x80);
    let client = S7Client::with_sink(config(), Arc::new(voltage_s7::NullSink));
    let (client_io, server_io) = tokio::io::duplex(4096);
    tokio::spawn(plc.serve(server_io));

    let result = client.connect_with(client_io).await;
    assert!(matches!(result, Err(S7Error::Handshake(_))));
    assert_eq!(client.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_raw_read_write() {
    let plc = MockPlc::new(240);
    plc.fill(Area::DataBlock, 10, 0, &[0xDE, 0xAD, 0xBE, 0xEF]);
    let client = connect(&plc, config()).await;

    let data = client.read_db(10, 0, 4).await.unwrap();
    assert_eq!(&data[..], &[0xDE, 0xAD, 0xBE, 0xEF]);

    client.write_db(10, 2, &[0x01, 0x02]).await.unwrap();
    assert_eq!(plc.dump(Area::DataBlock, 10, 0, 4), vec![0xDE, 0xAD, 0x01, 0x02]);

    client.write_outputs(1, &[0x55]).await.unwrap();
    let outputs = client.read_outputs(0, 2).await.unwrap();
    assert_eq!(&outputs[..], &[0x00, 0x55]);

    let recorded = plc.requests();
    assert_eq!(
        recorded[0],
        Recorded {
            op: Op::Read,
            area: 0x84,
            db: 10,
            offset: 0,
            length: 4
        }
    );
    assert_eq!(recorded[2].area, 0x82);
    assert_eq!(recorded[2].db, 0);
}

#[tokio::test]
async fn test_chunked_read() {
    let plc = MockPlc::new(64);
    let block: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
    plc.fill(Area::DataBlock, 1, 0, &block);
    let client = connect(&plc, config()).await;

    let data = client.read_db(1, 0, 500).await.unwrap();
    assert_eq!(&data[..], &block[..]);

    let chunks: Vec<(u32, usize)> = plc
        .requests()
        .iter()
        .map(|r| (r.offset, r.length))
        .collect();
    assert_eq!(chunks, vec![(0, 200), (200, 200), (400, 100)]);
}

#[tokio::test]
async fn test_chunked_read_failure_aborts() {
    let plc = MockPlc::new(64).fail_at(1, 0x05);
    let client = connect(&plc, config()).await;

    let result = client.read_db(1, 0, 500).await;
    assert!(matches!(result, Err(S7Error::Item(ReturnCode::AccessDenied))));

    // No further chunks after the failing one
    assert_eq!(plc.requests().len(), 2);
    // Item errors keep the session
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_chunked_write() {
    let plc = MockPlc::new(240);
    let client = connect(&plc, config()).await;

    let block: Vec<u8> = (0..500u32).map(|i| (i % 13) as u8).collect();
    client.write_db(5, 100, &block).await.unwrap();

    assert_eq!(plc.dump(Area::DataBlock, 5, 100, 500), block);
    let chunks: Vec<(u32, usize)> = plc
        .requests()
        .iter()
        .map(|r| (r.offset, r.length))
        .collect();
    assert_eq!(chunks, vec![(100, 210), (310, 210), (520, 80)]);
}

#[tokio::test]
async fn test_chunked_write_failure_keeps_earlier_chunks() {
    let plc = MockPlc::new(240).fail_at(1, 0x0A);
    let client = connect(&plc, config()).await;

    let block = vec![0x11u8; 500];
    let result = client.write_db(5, 0, &block).await;
    assert!(matches!(result, Err(S7Error::Item(ReturnCode::Unavailable))));

    assert_eq!(plc.dump(Area::DataBlock, 5, 0, 210), vec![0x11; 210]);
    assert_eq!(plc.dump(Area::DataBlock, 5, 210, 290), vec![0x00; 290]);
}

#[tokio::test]
async fn test_return_codes() {
    let plc = MockPlc::new(240).fail_at(0, 0x03);
    let client = connect(&plc, config()).await;

    let err = client.read_db(99, 0, 2).await.unwrap_err();
    assert_eq!(err.return_code(), Some(ReturnCode::ObjectNotFound));
    assert!(err.is_item_error());

    // The next request on the same session succeeds
    assert!(client.read_db(99, 0, 2).await.is_ok());
}

#[tokio::test]
async fn test_typed_access() {
    let plc = MockPlc::new(240);
    let client = connect(&plc, config()).await;
    let base = Address::db(10, 0);

    client.write_real(base.advance(4), 1.0).await.unwrap();
    assert_eq!(
        plc.dump(Area::DataBlock, 10, 4, 4),
        vec![0x3F, 0x80, 0x00, 0x00]
    );
    assert_eq!(client.read_real(base.advance(4)).await.unwrap(), 1.0);

    client.write_word(base, 0x1234).await.unwrap();
    assert_eq!(client.read_word(base).await.unwrap(), 0x1234);

    client.write_int(base.advance(8), -300).await.unwrap();
    assert_eq!(client.read_int(base.advance(8)).await.unwrap(), -300);

    client.write_dint(base.advance(12), i32::MIN).await.unwrap();
    assert_eq!(client.read_dint(base.advance(12)).await.unwrap(), i32::MIN);

    client.write_dword(base.advance(16), 0xCAFE_F00D).await.unwrap();
    assert_eq!(client.read_dword(base.advance(16)).await.unwrap(), 0xCAFE_F00D);

    client.write_lreal(base.advance(20), -0.5).await.unwrap();
    assert_eq!(client.read_lreal(base.advance(20)).await.unwrap(), -0.5);

    client.write_byte(base.advance(28), 0x7F).await.unwrap();
    assert_eq!(client.read_byte(base.advance(28)).await.unwrap(), 0x7F);
}

#[tokio::test]
async fn test_string_and_date_time() {
    let plc = MockPlc::new(240);
    let client = connect(&plc, config()).await;

    client
        .write_string(Address::db(3, 0), "AB", 5)
        .await
        .unwrap();
    assert_eq!(
        plc.dump(Area::DataBlock, 3, 0, 7),
        vec![0x05, 0x02, b'A', b'B', 0x00, 0x00, 0x00]
    );
    assert_eq!(
        client.read_string(Address::db(3, 0), 5).await.unwrap(),
        "AB"
    );

    let dt = S7DateTime::new(1999, 12, 31, 23, 59, 59, 999).unwrap();
    client
        .write_date_time(Address::db(3, 20), &dt)
        .await
        .unwrap();
    assert_eq!(
        plc.dump(Area::DataBlock, 3, 20, 8),
        vec![0x99, 0x12, 0x31, 0x23, 0x59, 0x59, 0x99, 0x09]
    );
    assert_eq!(
        client.read_date_time(Address::db(3, 20)).await.unwrap(),
        dt
    );
}

#[tokio::test]
async fn test_arrays() {
    let plc = MockPlc::new(240);
    let client = connect(&plc, config()).await;

    let ints = [1i16, -1, 300, i16::MIN];
    client
        .write_int_array(Address::db(7, 0), &ints)
        .await
        .unwrap();
    assert_eq!(
        client.read_int_array(Address::db(7, 0), 4).await.unwrap(),
        ints.to_vec()
    );

    // 120 REALs span more than one read chunk
    let reals: Vec<f32> = (0..120).map(|i| i as f32 * 0.5).collect();
    client
        .write_real_array(Address::db(7, 100), &reals)
        .await
        .unwrap();
    assert_eq!(
        client
            .read_real_array(Address::db(7, 100), 120)
            .await
            .unwrap(),
        reals
    );
}

#[tokio::test]
async fn test_truncated_reply_fails_typed_reads() {
    let plc = MockPlc::new(240).truncate_reads(4);
    plc.fill(Area::DataBlock, 1, 0, &[0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04]);
    let client = connect(&plc, config()).await;

    assert!(matches!(
        client.read_int_array(Address::db(1, 0), 4).await,
        Err(S7Error::ShortRead {
            expected: 8,
            actual: 4
        })
    ));
    assert!(matches!(
        client.read_real_array(Address::db(1, 0), 2).await,
        Err(S7Error::ShortRead {
            expected: 8,
            actual: 4
        })
    ));
    assert!(matches!(
        client.read_lreal(Address::db(1, 0)).await,
        Err(S7Error::ShortRead {
            expected: 8,
            actual: 4
        })
    ));

    // Values that fit in the truncated reply still decode
    assert_eq!(
        client.read_int_array(Address::db(1, 0), 2).await.unwrap(),
        vec![1, 2]
    );
    assert_eq!(client.read_dint(Address::db(1, 0)).await.unwrap(), 0x0001_0002);

    // The raw layer returns what the controller sent
    let raw = client.read_db(1, 0, 8).await.unwrap();
    assert_eq!(&raw[..], &[0x00, 0x01, 0x00, 0x02]);
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_bit_read_modify_write() {
    let plc = MockPlc::new(240);
    plc.fill(Area::Flags, 0, 2, &[0b1000_0001]);
    let client = connect(&plc, config()).await;
    let address = Address::flags(2);

    client.write_bit(address, 3, true).await.unwrap();
    assert_eq!(plc.dump(Area::Flags, 0, 2, 1), vec![0b1000_1001]);
    assert!(client.read_bit(address, 3).await.unwrap());

    client.write_bit(address, 3, false).await.unwrap();
    assert_eq!(plc.dump(Area::Flags, 0, 2, 1), vec![0b1000_0001]);
    assert!(!client.read_bit(address, 3).await.unwrap());

    let ops: Vec<Op> = plc.requests().iter().take(2).map(|r| r.op).collect();
    assert_eq!(ops, vec![Op::Read, Op::Write]);

    assert!(matches!(
        client.write_bit(address, 8, true).await,
        Err(S7Error::InvalidBit(8))
    ));
}

#[tokio::test]
async fn test_concurrent_callers_share_session() {
    let plc = MockPlc::new(64);
    plc.fill(Area::DataBlock, 1, 0, &[0xAB; 600]);
    plc.fill(Area::DataBlock, 2, 0, &[0x01, 0x02]);
    let client = Arc::new(connect(&plc, config()).await);

    let worker = client.clone();
    let bulk = tokio::spawn(async move { worker.read_db(1, 0, 600).await });
    let small = client.read_word(Address::db(2, 0)).await.unwrap();
    let bulk = bulk.await.unwrap().unwrap();

    assert_eq!(small, 0x0102);
    assert_eq!(bulk.len(), 600);
    assert!(bulk.iter().all(|&b| b == 0xAB));
}

#[tokio::test]
async fn test_disconnect_aborts_pending_request() {
    let plc = MockPlc::new(240).silent();
    let client = Arc::new(connect(&plc, ClientConfig::new("mock-plc")).await);

    let worker = client.clone();
    let pending = tokio::spawn(async move { worker.read_db(1, 0, 4).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.disconnect().await;
    let result = pending.await.unwrap();
    assert!(matches!(result, Err(S7Error::Aborted)));
    assert_eq!(client.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_response_timeout_drops_session() {
    let plc = MockPlc::new(240).silent();
    let client = connect(
        &plc,
        ClientConfig::new("mock-plc").response_timeout(Duration::from_millis(100)),
    )
    .await;

    let result = client.read_db(1, 0, 4).await;
    assert!(matches!(result, Err(S7Error::ResponseTimeout)));
    assert_eq!(client.state().await, SessionState::Disconnected);
    assert!(matches!(
        client.read_db(1, 0, 4).await,
        Err(S7Error::NotConnected)
    ));
}

#[tokio::test]
async fn test_disconnect_and_reconnect() {
    let plc = MockPlc::new(240);
    let client = connect(&plc, config()).await;

    client.disconnect().await;
    client.disconnect().await;
    assert!(matches!(
        client.read_db(1, 0, 1).await,
        Err(S7Error::NotConnected)
    ));

    let (client_io, server_io) = tokio::io::duplex(4096);
    tokio::spawn(plc.clone().serve(server_io));
    client.connect_with(client_io).await.unwrap();
    assert!(client.read_db(1, 0, 1).await.is_ok());
}

#[tokio::test]
async fn test_sink_receives_progress() {
    let plc = MockPlc::new(64);
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let captured = lines.clone();
    let sink: SharedSink = Arc::new(move |msg: &str| {
        captured.lock().unwrap().push(msg.to_string());
    });

    let client = S7Client::with_sink(config(), sink);
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(plc.clone().serve(server_io));
    client.connect_with(client_io).await.unwrap();
    client.read_db(1, 0, 450).await.unwrap();

    let lines = lines.lock().unwrap();
    assert!(lines.iter().any(|l| l == "COTP connection confirmed"));
    assert!(lines.iter().any(|l| l == "Negotiated PDU size: 64"));
    assert_eq!(
        lines
            .iter()
            .filter(|l| l.starts_with("Reading chunk"))
            .count(),
        3
    );
}
