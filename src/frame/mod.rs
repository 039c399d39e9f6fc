//! RFC 7540 §4/§6 frame codec: parse the 9-byte common header plus the ten
//! defined payload shapes, and serialize frames back to wire bytes.
//!
//! Unknown frame types decode to [`Frame::Unknown`] and must be silently
//! discarded by the connection layer (RFC 7540 §4.1) rather than treated as
//! an error; every other payload is validated against its length class here
//! so the connection/stream state machines never see a malformed frame.

pub mod settings;

use crate::error::Error;
use crate::flags::{
    ContinuationFlags, DataFlags, HeadersFlags, PingFlags, PushPromiseFlags, SettingsFlags,
};
use crate::types::{ErrorCode, FrameType, StreamId, U31_MAX};
use bytes::{Bytes, BytesMut};
use num_traits::FromPrimitive;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use settings::SettingsUpdate;

/// The 9-byte frame header shared by every frame type.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: StreamId,
}

impl FrameHeader {
    pub const SIZE: usize = 9;

    fn parse(buf: &[u8; Self::SIZE]) -> Self {
        let length = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]);
        let frame_type = buf[3];
        let flags = buf[4];
        // The top bit is reserved and MUST be ignored on receipt, not rejected.
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & U31_MAX;
        Self {
            length,
            frame_type,
            flags,
            stream_id,
        }
    }

    fn write(&self, out: &mut BytesMut) {
        let len = self.length.to_be_bytes();
        out.extend_from_slice(&len[1..]);
        out.extend_from_slice(&[self.frame_type, self.flags]);
        out.extend_from_slice(&self.stream_id.to_be_bytes());
    }
}

/// Stream dependency/weight carried by PRIORITY frames and the PRIORITY flag
/// on HEADERS. Weight is stored as the wire byte (0..=255); the effective
/// RFC 7540 §5.3.2 weight is `weight as u16 + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub dependency: StreamId,
    pub exclusive: bool,
    pub weight: u8,
}

impl Priority {
    fn parse(buf: &[u8; 5]) -> Self {
        let raw = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        Self {
            dependency: raw & U31_MAX,
            exclusive: raw & 0x8000_0000 != 0,
            weight: buf[4],
        }
    }

    fn write(&self, out: &mut BytesMut) {
        let mut raw = self.dependency & U31_MAX;
        if self.exclusive {
            raw |= 0x8000_0000;
        }
        out.extend_from_slice(&raw.to_be_bytes());
        out.extend_from_slice(&[self.weight]);
    }
}

impl Default for Priority {
    /// RFC 7540 §5.3.5: no dependency, non-exclusive, weight 16 (stored as
    /// the wire byte 15).
    fn default() -> Self {
        Self {
            dependency: 0,
            exclusive: false,
            weight: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Frame {
    Data {
        stream_id: StreamId,
        end_stream: bool,
        data: Bytes,
        /// Total bytes this frame consumed from the flow-control window,
        /// including any padding and the pad-length byte itself.
        flow_controlled_length: u32,
    },
    Headers {
        stream_id: StreamId,
        end_stream: bool,
        end_headers: bool,
        priority: Option<Priority>,
        header_block: Bytes,
    },
    Priority {
        stream_id: StreamId,
        priority: Priority,
    },
    RstStream {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    Settings {
        ack: bool,
        params: Vec<SettingsUpdate>,
    },
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
        end_headers: bool,
        header_block: Bytes,
    },
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: StreamId,
        increment: u32,
    },
    Continuation {
        stream_id: StreamId,
        end_headers: bool,
        header_block: Bytes,
    },
    Unknown {
        frame_type: u8,
        flags: u8,
        stream_id: StreamId,
        payload: Bytes,
    },
}

impl Frame {
    /// Frame type tag, including for frames this build doesn't otherwise
    /// special-case (`Unknown`).
    #[must_use]
    pub fn frame_type(&self) -> Option<FrameType> {
        let raw = match self {
            Frame::Data { .. } => FrameType::Data as u8,
            Frame::Headers { .. } => FrameType::Headers as u8,
            Frame::Priority { .. } => FrameType::Priority as u8,
            Frame::RstStream { .. } => FrameType::ResetStream as u8,
            Frame::Settings { .. } => FrameType::Settings as u8,
            Frame::PushPromise { .. } => FrameType::PushPromise as u8,
            Frame::Ping { .. } => FrameType::Ping as u8,
            Frame::GoAway { .. } => FrameType::GoAway as u8,
            Frame::WindowUpdate { .. } => FrameType::WindowUpdate as u8,
            Frame::Continuation { .. } => FrameType::Continuation as u8,
            Frame::Unknown { .. } => return None,
        };
        FrameType::from_u8(raw)
    }

    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::PushPromise { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. }
            | Frame::Continuation { stream_id, .. }
            | Frame::Unknown { stream_id, .. } => *stream_id,
            Frame::Settings { .. } | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
        }
    }

    /// Read exactly one frame from `reader`, enforcing `max_frame_size` before
    /// the payload is allocated so a hostile peer can't force an oversized
    /// buffer just by lying in the length field.
    pub async fn read_from<R>(reader: &mut R, max_frame_size: u32) -> Result<Self, Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut header_buf = [0u8; FrameHeader::SIZE];
        read_exact_or_closed(reader, &mut header_buf).await?;
        let header = FrameHeader::parse(&header_buf);
        if header.length > max_frame_size {
            return Err(Error::protocol(
                ErrorCode::FrameSizeError,
                format!(
                    "frame length {} exceeds max_frame_size {}",
                    header.length, max_frame_size
                ),
            ));
        }
        let mut payload = vec![0u8; header.length as usize];
        read_exact_or_closed(reader, &mut payload).await?;
        Self::decode(&header, Bytes::from(payload))
    }

    fn decode(header: &FrameHeader, payload: Bytes) -> Result<Self, Error> {
        match FrameType::from_u8(header.frame_type) {
            Some(FrameType::Data) => decode_data(header, payload),
            Some(FrameType::Headers) => decode_headers(header, payload),
            Some(FrameType::Priority) => decode_priority(header, payload),
            Some(FrameType::ResetStream) => decode_rst_stream(header, payload),
            Some(FrameType::Settings) => decode_settings(header, payload),
            Some(FrameType::PushPromise) => decode_push_promise(header, payload),
            Some(FrameType::Ping) => decode_ping(header, payload),
            Some(FrameType::GoAway) => decode_goaway(header, payload),
            Some(FrameType::WindowUpdate) => decode_window_update(header, payload),
            Some(FrameType::Continuation) => decode_continuation(header, payload),
            None => Ok(Frame::Unknown {
                frame_type: header.frame_type,
                flags: header.flags,
                stream_id: header.stream_id,
                payload,
            }),
        }
    }

    /// Serialize to a single contiguous buffer; callers must hand the whole
    /// thing to the transport in one write so a header is never separated
    /// from its payload by an interleaved frame.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::new();
        match self {
            Frame::Data {
                stream_id,
                end_stream,
                data,
                ..
            } => {
                let mut flags = DataFlags::empty();
                if *end_stream {
                    flags |= DataFlags::END_STREAM;
                }
                write_frame(&mut out, FrameType::Data as u8, flags.bits(), *stream_id, |body| {
                    body.extend_from_slice(data);
                });
            }
            Frame::Headers {
                stream_id,
                end_stream,
                end_headers,
                priority,
                header_block,
            } => {
                let mut flags = HeadersFlags::empty();
                if *end_stream {
                    flags |= HeadersFlags::END_STREAM;
                }
                if *end_headers {
                    flags |= HeadersFlags::END_HEADERS;
                }
                if priority.is_some() {
                    flags |= HeadersFlags::PRIORITY;
                }
                write_frame(&mut out, FrameType::Headers as u8, flags.bits(), *stream_id, |body| {
                    if let Some(p) = priority {
                        p.write(body);
                    }
                    body.extend_from_slice(header_block);
                });
            }
            Frame::Priority {
                stream_id,
                priority,
            } => {
                write_frame(&mut out, FrameType::Priority as u8, 0, *stream_id, |body| {
                    priority.write(body);
                });
            }
            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                write_frame(&mut out, FrameType::ResetStream as u8, 0, *stream_id, |body| {
                    body.extend_from_slice(&(*error_code as u32).to_be_bytes());
                });
            }
            Frame::Settings { ack, params } => {
                let flags = if *ack { SettingsFlags::ACK.bits() } else { 0 };
                write_frame(&mut out, FrameType::Settings as u8, flags, 0, |body| {
                    for update in params {
                        body.extend_from_slice(&update.identifier.to_be_bytes());
                        body.extend_from_slice(&update.value.to_be_bytes());
                    }
                });
            }
            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                end_headers,
                header_block,
            } => {
                let mut flags = PushPromiseFlags::empty();
                if *end_headers {
                    flags |= PushPromiseFlags::END_HEADERS;
                }
                write_frame(&mut out, FrameType::PushPromise as u8, flags.bits(), *stream_id, |body| {
                    body.extend_from_slice(&(promised_stream_id & U31_MAX).to_be_bytes());
                    body.extend_from_slice(header_block);
                });
            }
            Frame::Ping { ack, data } => {
                let flags = if *ack { PingFlags::ACK.bits() } else { 0 };
                write_frame(&mut out, FrameType::Ping as u8, flags, 0, |body| {
                    body.extend_from_slice(data);
                });
            }
            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                write_frame(&mut out, FrameType::GoAway as u8, 0, 0, |body| {
                    body.extend_from_slice(&(last_stream_id & U31_MAX).to_be_bytes());
                    body.extend_from_slice(&(*error_code as u32).to_be_bytes());
                    body.extend_from_slice(debug_data);
                });
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                write_frame(&mut out, FrameType::WindowUpdate as u8, 0, *stream_id, |body| {
                    body.extend_from_slice(&(increment & U31_MAX).to_be_bytes());
                });
            }
            Frame::Continuation {
                stream_id,
                end_headers,
                header_block,
            } => {
                let flags = if *end_headers {
                    ContinuationFlags::END_HEADERS.bits()
                } else {
                    0
                };
                write_frame(&mut out, FrameType::Continuation as u8, flags, *stream_id, |body| {
                    body.extend_from_slice(header_block);
                });
            }
            Frame::Unknown {
                frame_type,
                flags,
                stream_id,
                payload,
            } => {
                write_frame(&mut out, *frame_type, *flags, *stream_id, |body| {
                    body.extend_from_slice(payload);
                });
            }
        }
        out
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin,
    {
        let buf = self.encode();
        writer.write_all(&buf).await.map_err(Error::Transport)
    }
}

fn write_frame(
    out: &mut BytesMut,
    frame_type: u8,
    flags: u8,
    stream_id: StreamId,
    fill: impl FnOnce(&mut BytesMut),
) {
    let header_pos = out.len();
    // Reserve the header; it's patched with the real length once the body is written.
    out.resize(header_pos + FrameHeader::SIZE, 0);
    fill(out);
    let length = (out.len() - header_pos - FrameHeader::SIZE) as u32;
    let header = FrameHeader {
        length,
        frame_type,
        flags,
        stream_id,
    };
    let mut header_bytes = BytesMut::new();
    header.write(&mut header_bytes);
    out[header_pos..header_pos + FrameHeader::SIZE].copy_from_slice(&header_bytes);
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::ConnectionClosed),
        Err(e) => Err(Error::Transport(e)),
    }
}

/// Strip RFC 7540 §6.1/§6.2 padding: a one-byte pad length followed by that
/// many octets of padding at the end of the frame payload. Returns the
/// unpadded slice and the number of bytes (pad length byte + padding) that
/// still count against the flow-control window for DATA frames.
fn strip_padding(payload: &Bytes, padded: bool) -> Result<(Bytes, u32), Error> {
    if !padded {
        return Ok((payload.clone(), 0));
    }
    if payload.is_empty() {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "PADDED flag set but frame has no pad length byte",
        ));
    }
    let pad_len = payload[0] as usize;
    if pad_len + 1 > payload.len() {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "padding length exceeds frame payload",
        ));
    }
    let content_end = payload.len() - pad_len;
    let unpadded = payload.slice(1..content_end);
    Ok((unpadded, 1 + pad_len as u32))
}

fn decode_data(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if header.stream_id == 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "DATA frame on stream 0",
        ));
    }
    let flags = DataFlags::from_bits_truncate(header.flags);
    let (data, _pad_overhead) = strip_padding(&payload, flags.contains(DataFlags::PADDED))?;
    // Per RFC 7540 §6.9.1 the whole frame, padding and pad-length byte
    // included, counts against the flow-control window.
    Ok(Frame::Data {
        stream_id: header.stream_id,
        end_stream: flags.contains(DataFlags::END_STREAM),
        flow_controlled_length: header.length,
        data,
    })
}

fn decode_headers(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if header.stream_id == 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "HEADERS frame on stream 0",
        ));
    }
    let flags = HeadersFlags::from_bits_truncate(header.flags);
    let (mut body, _) = strip_padding(&payload, flags.contains(HeadersFlags::PADDED))?;
    let priority = if flags.contains(HeadersFlags::PRIORITY) {
        if body.len() < 5 {
            return Err(Error::protocol(
                ErrorCode::FrameSizeError,
                "HEADERS PRIORITY flag set but payload too short",
            ));
        }
        let mut buf = [0u8; 5];
        buf.copy_from_slice(&body[..5]);
        body = body.slice(5..);
        let priority = Priority::parse(&buf);
        if priority.dependency == header.stream_id {
            return Err(Error::stream(
                ErrorCode::ProtocolError,
                header.stream_id,
                "stream cannot depend on itself",
            ));
        }
        Some(priority)
    } else {
        None
    };
    Ok(Frame::Headers {
        stream_id: header.stream_id,
        end_stream: flags.contains(HeadersFlags::END_STREAM),
        end_headers: flags.contains(HeadersFlags::END_HEADERS),
        priority,
        header_block: body,
    })
}

fn decode_priority(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if payload.len() != 5 {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            "PRIORITY frame must be exactly 5 octets",
        ));
    }
    if header.stream_id == 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "PRIORITY frame on stream 0",
        ));
    }
    let mut buf = [0u8; 5];
    buf.copy_from_slice(&payload);
    let priority = Priority::parse(&buf);
    if priority.dependency == header.stream_id {
        return Err(Error::stream(
            ErrorCode::ProtocolError,
            header.stream_id,
            "stream cannot depend on itself",
        ));
    }
    Ok(Frame::Priority {
        stream_id: header.stream_id,
        priority,
    })
}

fn decode_rst_stream(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if payload.len() != 4 {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            "RST_STREAM frame must be exactly 4 octets",
        ));
    }
    if header.stream_id == 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "RST_STREAM frame on stream 0",
        ));
    }
    let code = u32::from_be_bytes(payload[..4].try_into().unwrap());
    Ok(Frame::RstStream {
        stream_id: header.stream_id,
        error_code: ErrorCode::from_wire(code),
    })
}

fn decode_settings(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if header.stream_id != 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "SETTINGS frame on non-zero stream",
        ));
    }
    let flags = SettingsFlags::from_bits_truncate(header.flags);
    let ack = flags.contains(SettingsFlags::ACK);
    if ack && !payload.is_empty() {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            "SETTINGS ACK must have an empty payload",
        ));
    }
    if payload.len() % 6 != 0 {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            "SETTINGS payload must be a multiple of 6 octets",
        ));
    }
    let mut params = Vec::with_capacity(payload.len() / 6);
    for chunk in payload.chunks(6) {
        let identifier = u16::from_be_bytes([chunk[0], chunk[1]]);
        let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
        params.push(SettingsUpdate { identifier, value });
    }
    Ok(Frame::Settings { ack, params })
}

fn decode_push_promise(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if header.stream_id == 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "PUSH_PROMISE frame on stream 0",
        ));
    }
    let flags = PushPromiseFlags::from_bits_truncate(header.flags);
    let (mut body, _) = strip_padding(&payload, flags.contains(PushPromiseFlags::PADDED))?;
    if body.len() < 4 {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            "PUSH_PROMISE payload too short",
        ));
    }
    let promised_stream_id = u32::from_be_bytes(body[..4].try_into().unwrap()) & U31_MAX;
    body = body.slice(4..);
    Ok(Frame::PushPromise {
        stream_id: header.stream_id,
        promised_stream_id,
        end_headers: flags.contains(PushPromiseFlags::END_HEADERS),
        header_block: body,
    })
}

fn decode_ping(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if header.stream_id != 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "PING frame on non-zero stream",
        ));
    }
    if payload.len() != 8 {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            "PING frame must be exactly 8 octets",
        ));
    }
    let flags = PingFlags::from_bits_truncate(header.flags);
    let mut data = [0u8; 8];
    data.copy_from_slice(&payload);
    Ok(Frame::Ping {
        ack: flags.contains(PingFlags::ACK),
        data,
    })
}

fn decode_goaway(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if header.stream_id != 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "GOAWAY frame on non-zero stream",
        ));
    }
    if payload.len() < 8 {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            "GOAWAY payload too short",
        ));
    }
    let last_stream_id = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & U31_MAX;
    let code = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    Ok(Frame::GoAway {
        last_stream_id,
        error_code: ErrorCode::from_wire(code),
        debug_data: payload.slice(8..),
    })
}

fn decode_window_update(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if payload.len() != 4 {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            "WINDOW_UPDATE frame must be exactly 4 octets",
        ));
    }
    let increment = u32::from_be_bytes(payload[..4].try_into().unwrap()) & U31_MAX;
    if increment == 0 {
        let message = "WINDOW_UPDATE increment of 0";
        return Err(if header.stream_id == 0 {
            Error::protocol(ErrorCode::ProtocolError, message)
        } else {
            Error::stream(ErrorCode::ProtocolError, header.stream_id, message)
        });
    }
    Ok(Frame::WindowUpdate {
        stream_id: header.stream_id,
        increment,
    })
}

fn decode_continuation(header: &FrameHeader, payload: Bytes) -> Result<Frame, Error> {
    if header.stream_id == 0 {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "CONTINUATION frame on stream 0",
        ));
    }
    let flags = ContinuationFlags::from_bits_truncate(header.flags);
    Ok(Frame::Continuation {
        stream_id: header.stream_id,
        end_headers: flags.contains(ContinuationFlags::END_HEADERS),
        header_block: payload,
    })
}
