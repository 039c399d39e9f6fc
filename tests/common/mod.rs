//! Wire-level peer simulation shared by the integration tests. `h2_core`
//! deliberately doesn't export its frame codec, so a test peer speaks the
//! wire format directly rather than reaching into the crate's internals —
//! the same boundary a real HTTP/2 server on the other end of the socket
//! would be behind.

#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const TYPE_DATA: u8 = 0x0;
pub const TYPE_HEADERS: u8 = 0x1;
pub const TYPE_RST_STREAM: u8 = 0x3;
pub const TYPE_SETTINGS: u8 = 0x4;
pub const TYPE_GOAWAY: u8 = 0x7;
pub const TYPE_WINDOW_UPDATE: u8 = 0x8;

pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;

pub const ERROR_CODE_PROTOCOL: u32 = 0x1;
pub const ERROR_CODE_CANCEL: u32 = 0x8;
pub const ERROR_CODE_FRAME_SIZE: u32 = 0x6;
pub const ERROR_CODE_COMPRESSION: u32 = 0x9;

/// A frame as read straight off the wire, with no knowledge of the
/// payload's per-type shape beyond what each test needs to check.
pub struct RawFrame {
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Vec<u8>,
}

/// A duplex pair large enough that none of these tests ever block on
/// backpressure; `client_io` is handed to `ProtocolEngine::spawn`, `peer` is
/// driven directly by the test.
#[must_use]
pub fn pair() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(1 << 20)
}

pub fn encode_frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + payload.len());
    let len = (payload.len() as u32).to_be_bytes();
    out.extend_from_slice(&len[1..]);
    out.push(frame_type);
    out.push(flags);
    out.extend_from_slice(&(stream_id & 0x7fff_ffff).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn settings_frame(params: &[(u16, u32)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(params.len() * 6);
    for (identifier, value) in params {
        payload.extend_from_slice(&identifier.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
    }
    encode_frame(TYPE_SETTINGS, 0, 0, &payload)
}

pub fn settings_ack() -> Vec<u8> {
    encode_frame(TYPE_SETTINGS, FLAG_ACK, 0, &[])
}

pub fn window_update_frame(stream_id: u32, increment: u32) -> Vec<u8> {
    encode_frame(TYPE_WINDOW_UPDATE, 0, stream_id, &increment.to_be_bytes())
}

pub fn rst_stream_frame(stream_id: u32, error_code: u32) -> Vec<u8> {
    encode_frame(TYPE_RST_STREAM, 0, stream_id, &error_code.to_be_bytes())
}

/// RFC 7541 §5.1 integer encoding, reimplemented independently of the
/// crate's own encoder so these fixtures don't depend on the code under test.
pub fn encode_int(value: usize, prefix_bits: u8) -> Vec<u8> {
    let max_prefix = (1usize << prefix_bits) - 1;
    if value < max_prefix {
        return vec![value as u8];
    }
    let mut out = vec![max_prefix as u8];
    let mut remainder = value - max_prefix;
    while remainder >= 128 {
        out.push(((remainder % 128) + 128) as u8);
        remainder /= 128;
    }
    out.push(remainder as u8);
    out
}

/// An indexed header field referencing the static or dynamic table.
pub fn hpack_indexed(index: u8) -> Vec<u8> {
    vec![0x80 | index]
}

/// A literal header field with a new (not table-referenced) name, without
/// indexing, Huffman disabled.
pub fn hpack_literal_new_name(name: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = vec![0x00];
    out.extend_from_slice(&encode_int(name.len(), 7));
    out.extend_from_slice(name);
    out.extend_from_slice(&encode_int(value.len(), 7));
    out.extend_from_slice(value);
    out
}

pub async fn expect_preface(peer: &mut DuplexStream) {
    let mut buf = [0u8; 24];
    peer.read_exact(&mut buf).await.expect("client preface");
    assert_eq!(&buf, PREFACE, "client did not send the RFC 7540 §3.5 preface");
}

pub async fn read_frame(peer: &mut DuplexStream) -> RawFrame {
    let mut header = [0u8; 9];
    peer.read_exact(&mut header).await.expect("frame header");
    let length = u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
    let frame_type = header[3];
    let flags = header[4];
    let stream_id = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) & 0x7fff_ffff;
    let mut payload = vec![0u8; length];
    if length > 0 {
        peer.read_exact(&mut payload).await.expect("frame payload");
    }
    RawFrame { frame_type, flags, stream_id, payload }
}

/// Reads the initial `PREFACE` and the client's opening SETTINGS frame,
/// returning nothing — callers that need the negotiated values can
/// `read_frame` themselves instead.
pub async fn complete_client_preamble(peer: &mut DuplexStream) {
    expect_preface(peer).await;
    let settings = read_frame(peer).await;
    assert_eq!(settings.frame_type, TYPE_SETTINGS);
    assert_eq!(settings.flags & FLAG_ACK, 0);
}
