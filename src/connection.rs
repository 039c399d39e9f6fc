//! RFC 7540 §4/§5/§6.5 connection state: settings negotiation, the stream
//! table, flow control, and the HPACK codec pair. This is pure logic with
//! no I/O of its own — [`crate::engine::ProtocolEngine`] owns the actual
//! reader/writer tasks and feeds frames through here.

use crate::error::{Error, Result};
use crate::flow_control::{FlowControlManager, Scope, Window};
use crate::frame::{
    settings::{Settings, SettingsUpdate},
    Frame,
};
use crate::hpack::{Decoder, Encoder};
use crate::limits::Config;
use crate::request::Request;
use crate::response::Response;
use crate::stream::Stream;
use crate::types::{ErrorCode, HeaderList, SettingsParameter, StreamId};
use bytes::Bytes;
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::oneshot;

/// How many recently-closed stream ids to remember so a late frame from a
/// conformant-but-racing peer is discarded instead of misread as a frame for
/// a stream that was never created. Bounded so a long-lived connection with
/// many short streams doesn't grow this without limit.
const CLOSED_STREAM_CACHE_SIZE: usize = 1024;

/// Which kind of header block a run of CONTINUATION frames is extending;
/// tracked per-stream only while a block is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderBlockKind {
    Headers,
    PushPromise,
}

pub struct ConnectionState {
    config: Config,
    local_settings: Settings,
    peer_settings: Settings,
    encoder: Encoder,
    decoder: Decoder,
    flow: FlowControlManager,
    streams: HashMap<StreamId, Stream>,
    next_stream_id: StreamId,
    closed_streams: HashSet<StreamId>,
    closed_stream_order: VecDeque<StreamId>,
    header_block_kind: HashMap<StreamId, HeaderBlockKind>,
    goaway_received: Option<(StreamId, ErrorCode)>,
    goaway_sent: bool,
}

impl ConnectionState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let local_settings = Settings::local_defaults(&config);
        let peer_settings = Settings::defaults();
        let flow = FlowControlManager::new(
            local_settings.get(SettingsParameter::InitialWindowSize),
            peer_settings.get(SettingsParameter::InitialWindowSize),
        );
        let encoder = Encoder::new(peer_settings.get(SettingsParameter::HeaderTableSize) as usize);
        let decoder = Decoder::new(config.header_table_size as usize);
        Self {
            config,
            local_settings,
            peer_settings,
            encoder,
            decoder,
            flow,
            streams: HashMap::new(),
            next_stream_id: 1,
            closed_streams: HashSet::new(),
            closed_stream_order: VecDeque::new(),
            header_block_kind: HashMap::new(),
            goaway_received: None,
            goaway_sent: false,
        }
    }

    /// The SETTINGS frame to send immediately after the connection preface.
    #[must_use]
    pub fn initial_settings_frame(&self) -> Frame {
        Frame::Settings {
            ack: false,
            params: self.local_settings.to_wire_updates(),
        }
    }

    #[must_use]
    pub fn peer_max_frame_size(&self) -> u32 {
        self.peer_settings.get(SettingsParameter::MaxFrameSize)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.goaway_received.is_some() || self.goaway_sent
    }

    /// Record that a GOAWAY was written to the peer, so further `submit`
    /// calls are refused locally without waiting on a reply.
    pub fn mark_goaway_sent(&mut self) {
        self.goaway_sent = true;
    }

    /// Begin a new client-initiated request. Returns the stream id, the
    /// frames to write (HEADERS plus any CONTINUATION), and leaves the body
    /// (if any) queued for the writer to drain via [`Self::drain_writable`].
    pub fn submit(
        &mut self,
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    ) -> Result<(StreamId, Vec<Frame>)> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let max_concurrent = self.peer_settings.get(SettingsParameter::MaxConcurrentStreams) as usize;
        if self.streams.len() >= max_concurrent {
            return Err(Error::protocol(
                ErrorCode::RefusedStream,
                "max concurrent streams reached",
            ));
        }

        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;

        let send_window = Window::new(self.peer_settings.get(SettingsParameter::InitialWindowSize));
        let recv_window = Window::new(self.local_settings.get(SettingsParameter::InitialWindowSize));
        let mut stream = Stream::new(stream_id, send_window, recv_window, response_tx);

        let (headers, body, trailers) = request.into_parts();
        let has_body = !body.is_empty() || trailers.is_some();
        stream.on_send(crate::types::FrameType::Headers, !has_body)?;
        if has_body {
            stream.queue_body(body, trailers);
        }

        let block = self.encoder.encode(&headers);
        let frames = self.split_header_block(stream_id, block, !has_body, None);

        self.streams.insert(stream_id, stream);
        Ok((stream_id, frames))
    }

    /// Split an encoded header block into a HEADERS frame plus as many
    /// CONTINUATION frames as needed to respect the peer's MAX_FRAME_SIZE.
    fn split_header_block(
        &self,
        stream_id: StreamId,
        block: Bytes,
        end_stream: bool,
        priority: Option<crate::frame::Priority>,
    ) -> Vec<Frame> {
        let max_frame_size = self.peer_max_frame_size() as usize;
        if block.len() <= max_frame_size {
            return vec![Frame::Headers {
                stream_id,
                end_stream,
                end_headers: true,
                priority,
                header_block: block,
            }];
        }
        let mut frames = Vec::new();
        let mut rest = block;
        let first = rest.split_to(max_frame_size);
        frames.push(Frame::Headers {
            stream_id,
            end_stream,
            end_headers: false,
            priority,
            header_block: first,
        });
        while !rest.is_empty() {
            let chunk_len = max_frame_size.min(rest.len());
            let chunk = rest.split_to(chunk_len);
            let end_headers = rest.is_empty();
            frames.push(Frame::Continuation {
                stream_id,
                end_headers,
                header_block: chunk,
            });
        }
        frames
    }

    /// Record `stream_id` as closed so a later frame for it is discarded
    /// rather than misread as referring to a stream that was never opened.
    /// Idempotent; evicts the oldest entry once the cache is full.
    fn mark_closed(&mut self, stream_id: StreamId) {
        if self.closed_streams.insert(stream_id) {
            self.closed_stream_order.push_back(stream_id);
            if self.closed_stream_order.len() > CLOSED_STREAM_CACHE_SIZE {
                if let Some(oldest) = self.closed_stream_order.pop_front() {
                    self.closed_streams.remove(&oldest);
                }
            }
        }
    }

    #[must_use]
    fn is_closed_stream(&self, stream_id: StreamId) -> bool {
        self.closed_streams.contains(&stream_id)
    }

    /// Cancel an in-flight request: emit RST_STREAM(CANCEL) exactly once and
    /// remember the stream id so further frames on it are discarded rather
    /// than treated as protocol errors.
    pub fn cancel(&mut self, stream_id: StreamId) -> Option<Frame> {
        if self.is_closed_stream(stream_id) {
            return None;
        }
        self.mark_closed(stream_id);
        if let Some(mut stream) = self.streams.remove(&stream_id) {
            stream.fail(Error::Cancelled);
        }
        Some(Frame::RstStream {
            stream_id,
            error_code: ErrorCode::Cancel,
        })
    }

    /// Terminate a single stream after a stream-scoped protocol error: emit
    /// RST_STREAM for it, fail its response channel, and record it as
    /// closed so a frame that arrives afterward is discarded instead of
    /// being treated as a fresh connection-level violation. Returns `None`
    /// if the stream was already closed (no RST_STREAM is resent).
    pub fn fail_stream(&mut self, stream_id: StreamId, code: ErrorCode, message: &str) -> Option<Frame> {
        if self.is_closed_stream(stream_id) {
            return None;
        }
        self.mark_closed(stream_id);
        if let Some(mut stream) = self.streams.remove(&stream_id) {
            stream.fail(Error::stream(code, stream_id, message.to_string()));
        }
        self.header_block_kind.remove(&stream_id);
        Some(Frame::RstStream { stream_id, error_code: code })
    }

    /// Drain as much queued request body (and deferred trailers) as the
    /// current flow-control windows and MAX_FRAME_SIZE allow.
    pub fn drain_writable(&mut self) -> Result<Vec<Frame>> {
        let max_frame_size = self.peer_max_frame_size() as usize;
        let mut frames = Vec::new();
        let mut trailer_blocks = Vec::new();

        for (&stream_id, stream) in &mut self.streams {
            while stream.has_pending_write() {
                if stream.pending_body.is_empty() {
                    if let Some(trailers) = stream.take_pending_trailers() {
                        trailer_blocks.push((stream_id, trailers));
                    }
                    break;
                }
                let window_cap = self
                    .flow
                    .connection_send()
                    .remaining()
                    .min(stream.send_window.remaining())
                    .max(0) as usize;
                let max_len = max_frame_size.min(window_cap);
                if max_len == 0 {
                    break;
                }
                let Some((chunk, end_stream)) = stream.drain_body(max_len) else {
                    break;
                };
                self.flow.on_data_sent(&mut stream.send_window, chunk.len() as u32)?;
                stream.on_send(crate::types::FrameType::Data, end_stream)?;
                frames.push(Frame::Data {
                    stream_id,
                    end_stream,
                    flow_controlled_length: chunk.len() as u32,
                    data: chunk,
                });
            }
        }

        for (stream_id, trailers) in trailer_blocks {
            let block = self.encoder.encode(&trailers);
            let mut trailer_frames = self.split_header_block(stream_id, block, true, None);
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.on_send(crate::types::FrameType::Headers, true)?;
            }
            frames.append(&mut trailer_frames);
        }

        Ok(frames)
    }

    /// Process one received frame, mutating connection/stream state and
    /// returning any frames that must be written in response (SETTINGS ACK,
    /// PING ACK, WINDOW_UPDATE, RST_STREAM).
    pub fn handle_incoming(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        match frame {
            Frame::Settings { ack, params } => self.handle_settings(ack, params),
            Frame::WindowUpdate { stream_id, increment } => {
                self.handle_window_update(stream_id, increment)?;
                Ok(Vec::new())
            }
            Frame::Ping { ack, data } => Ok(if ack { Vec::new() } else { vec![Frame::Ping { ack: true, data }] }),
            Frame::GoAway { last_stream_id, error_code, debug_data } => {
                self.handle_goaway(last_stream_id, error_code, debug_data);
                Ok(Vec::new())
            }
            Frame::RstStream { stream_id, error_code } => {
                self.handle_rst_stream(stream_id, error_code);
                Ok(Vec::new())
            }
            Frame::Priority { stream_id, priority } => {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.priority = priority;
                }
                Ok(Vec::new())
            }
            Frame::Data { stream_id, end_stream, data, flow_controlled_length } => {
                self.handle_data(stream_id, end_stream, data, flow_controlled_length)
            }
            Frame::Headers { stream_id, end_stream, end_headers, priority, header_block } => {
                self.handle_headers(stream_id, end_stream, end_headers, priority, header_block)
            }
            Frame::PushPromise { stream_id, promised_stream_id, end_headers, header_block } => {
                self.handle_push_promise(stream_id, promised_stream_id, end_headers, header_block)
            }
            Frame::Continuation { stream_id, end_headers, header_block } => {
                self.handle_continuation(stream_id, end_headers, header_block)
            }
            Frame::Unknown { frame_type, .. } => {
                trace!("ignoring unknown frame type {frame_type:#x}");
                Ok(Vec::new())
            }
        }
    }

    fn handle_settings(&mut self, ack: bool, params: Vec<SettingsUpdate>) -> Result<Vec<Frame>> {
        if ack {
            return Ok(Vec::new());
        }

        let previous_initial_window = self.peer_settings.get(SettingsParameter::InitialWindowSize);
        for update in params {
            self.peer_settings.apply(update)?;
        }
        let new_initial_window = self.peer_settings.get(SettingsParameter::InitialWindowSize);
        if new_initial_window != previous_initial_window {
            let delta = i64::from(new_initial_window) - i64::from(previous_initial_window);
            for stream in self.streams.values_mut() {
                stream
                    .send_window
                    .apply_initial_window_delta(delta)
                    .map_err(|()| {
                        Error::protocol(
                            ErrorCode::FlowControlError,
                            "SETTINGS_INITIAL_WINDOW_SIZE change overflowed a stream's send window",
                        )
                    })?;
            }
        }
        self.encoder
            .set_max_dynamic_table_size(self.peer_settings.get(SettingsParameter::HeaderTableSize) as usize);

        debug!("applied peer SETTINGS, acking");
        Ok(vec![Frame::Settings { ack: true, params: Vec::new() }])
    }

    fn handle_window_update(&mut self, stream_id: StreamId, increment: u32) -> Result<()> {
        if stream_id == 0 {
            self.flow.on_window_update(Scope::Connection, increment, None)?;
            return Ok(());
        }
        if self.is_closed_stream(stream_id) {
            return Ok(());
        }
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Ok(());
        };
        self.flow
            .on_window_update(Scope::Stream(stream_id), increment, Some(&mut stream.send_window))
    }

    fn handle_goaway(&mut self, last_stream_id: StreamId, error_code: ErrorCode, debug_data: Bytes) {
        warn!("received GOAWAY({error_code:?}), last_stream_id={last_stream_id}");
        if !debug_data.is_empty() {
            if let Ok(text) = std::str::from_utf8(&debug_data) {
                debug!("GOAWAY debug data: {text}");
            }
        }
        self.goaway_received = Some((last_stream_id, error_code));
        let retry_ids: Vec<StreamId> = self
            .streams
            .keys()
            .copied()
            .filter(|&id| id > last_stream_id)
            .collect();
        for id in retry_ids {
            self.mark_closed(id);
            if let Some(mut stream) = self.streams.remove(&id) {
                stream.fail(Error::protocol(ErrorCode::RefusedStream, "connection is going away"));
            }
        }
    }

    fn handle_rst_stream(&mut self, stream_id: StreamId, error_code: ErrorCode) {
        self.mark_closed(stream_id);
        if let Some(mut stream) = self.streams.remove(&stream_id) {
            let _ = stream.on_reset(true);
            stream.fail(Error::stream(error_code, stream_id, "peer reset the stream"));
        }
        self.header_block_kind.remove(&stream_id);
    }

    /// Fail every currently open stream with the same connection-scoped
    /// error, e.g. when the connection itself is about to be torn down.
    /// Called in place of (not in addition to) completing those streams
    /// normally.
    pub fn fail_all(&mut self, code: ErrorCode, message: &str) {
        for (_, mut stream) in self.streams.drain() {
            stream.fail(Error::protocol(code, message.to_string()));
        }
        self.header_block_kind.clear();
    }

    fn push_enabled(&self) -> bool {
        self.local_settings.get(SettingsParameter::EnablePush) == 1
    }

    fn handle_data(
        &mut self,
        stream_id: StreamId,
        end_stream: bool,
        data: Bytes,
        flow_controlled_length: u32,
    ) -> Result<Vec<Frame>> {
        if self.is_closed_stream(stream_id) {
            return Ok(Vec::new());
        }
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(Error::protocol(ErrorCode::ProtocolError, "DATA received for an unknown stream"));
        };

        self.flow.on_data_received(stream_id, &mut stream.recv_window, flow_controlled_length)?;
        stream.on_recv(crate::types::FrameType::Data, end_stream, self.push_enabled())?;
        stream.body.extend_from_slice(&data);

        let mut frames = Vec::new();
        if stream.recv_window.needs_update() {
            let increment = stream.recv_window.update_increment();
            if increment > 0 {
                stream.recv_window.grant_receive_credit(increment);
                frames.push(Frame::WindowUpdate { stream_id, increment });
            }
        }
        if self.flow.connection_recv().needs_update() {
            let increment = self.flow.connection_recv().update_increment();
            if increment > 0 {
                self.flow.connection_recv_mut().grant_receive_credit(increment);
                frames.push(Frame::WindowUpdate { stream_id: 0, increment });
            }
        }

        if end_stream {
            let mut stream = self.streams.remove(&stream_id).expect("checked above");
            self.mark_closed(stream_id);
            stream.complete();
        }
        Ok(frames)
    }

    fn handle_headers(
        &mut self,
        stream_id: StreamId,
        end_stream: bool,
        end_headers: bool,
        priority: Option<crate::frame::Priority>,
        header_block: Bytes,
    ) -> Result<Vec<Frame>> {
        if self.is_closed_stream(stream_id) {
            return Ok(Vec::new());
        }
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(Error::protocol(ErrorCode::ProtocolError, "HEADERS received for an unknown stream"));
        };

        stream.on_recv(crate::types::FrameType::Headers, end_stream, self.push_enabled())?;
        if let Some(priority) = priority {
            stream.priority = priority;
        }

        let complete = stream.start_header_block(&header_block, end_headers)?;
        if !end_headers {
            self.header_block_kind.insert(stream_id, HeaderBlockKind::Headers);
            return Ok(Vec::new());
        }
        self.finish_header_block(stream_id, complete.expect("end_headers implies Some"), end_stream)
    }

    fn handle_push_promise(
        &mut self,
        stream_id: StreamId,
        _promised_stream_id: StreamId,
        end_headers: bool,
        header_block: Bytes,
    ) -> Result<Vec<Frame>> {
        if !self.push_enabled() {
            return Err(Error::protocol(ErrorCode::ProtocolError, "PUSH_PROMISE received with push disabled"));
        }
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(Error::protocol(ErrorCode::ProtocolError, "PUSH_PROMISE on an unknown originating stream"));
        };
        let complete = stream.start_header_block(&header_block, end_headers)?;
        if !end_headers {
            self.header_block_kind.insert(stream_id, HeaderBlockKind::PushPromise);
            return Ok(Vec::new());
        }
        // Push content is not exposed to the caller; decode purely to keep
        // the shared dynamic table in sync.
        self.decoder.decode(&complete.expect("end_headers implies Some"), self.config.decode_limits())?;
        Ok(Vec::new())
    }

    fn handle_continuation(
        &mut self,
        stream_id: StreamId,
        end_headers: bool,
        header_block: Bytes,
    ) -> Result<Vec<Frame>> {
        if self.is_closed_stream(stream_id) {
            return Ok(Vec::new());
        }
        let Some(kind) = self.header_block_kind.get(&stream_id).copied() else {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                "CONTINUATION received without a preceding HEADERS/PUSH_PROMISE",
            ));
        };
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(Error::protocol(ErrorCode::ProtocolError, "CONTINUATION for an unknown stream"));
        };
        let complete = stream.continue_header_block(&header_block, end_headers)?;
        let Some(block) = complete else {
            return Ok(Vec::new());
        };
        self.header_block_kind.remove(&stream_id);
        match kind {
            HeaderBlockKind::Headers => {
                let end_stream = stream.state == crate::stream::StreamState::HalfClosedRemote
                    || stream.state == crate::stream::StreamState::Closed;
                self.finish_header_block(stream_id, block, end_stream)
            }
            HeaderBlockKind::PushPromise => {
                self.decoder.decode(&block, self.config.decode_limits())?;
                Ok(Vec::new())
            }
        }
    }

    fn finish_header_block(&mut self, stream_id: StreamId, block: Bytes, end_stream: bool) -> Result<Vec<Frame>> {
        let headers = self.decoder.decode(&block, self.config.decode_limits())?;

        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Ok(Vec::new());
        };
        let is_trailers = !stream.response_headers.is_empty() || !stream.body.is_empty();
        validate_response_pseudo_headers(stream_id, &headers, is_trailers)?;

        if is_trailers {
            stream.trailers = Some(headers);
        } else {
            stream.response_headers = headers;
        }

        if end_stream {
            let mut stream = self.streams.remove(&stream_id).expect("checked above");
            self.mark_closed(stream_id);
            stream.complete();
        }
        Ok(Vec::new())
    }
}

/// RFC 7540 §8.1.2.1/§8.1.2.3: a response header block carries exactly one
/// `:status` pseudo-header, no other pseudo-header is valid on a response,
/// and every pseudo-header must precede the first regular header field. A
/// trailer block (the second header block on a stream) must not carry any
/// pseudo-header at all.
fn validate_response_pseudo_headers(stream_id: StreamId, headers: &HeaderList, is_trailers: bool) -> Result<()> {
    let mut seen_regular_field = false;
    let mut status_count = 0u32;
    for (name, _) in headers {
        let is_pseudo = name.first() == Some(&b':');
        if !is_pseudo {
            seen_regular_field = true;
            continue;
        }
        if is_trailers {
            return Err(Error::stream(
                ErrorCode::ProtocolError,
                stream_id,
                "trailers must not contain a pseudo-header field",
            ));
        }
        if seen_regular_field {
            return Err(Error::stream(
                ErrorCode::ProtocolError,
                stream_id,
                "pseudo-header field appeared after a regular header field",
            ));
        }
        if name.as_ref() == b":status" {
            status_count += 1;
        } else {
            return Err(Error::stream(
                ErrorCode::ProtocolError,
                stream_id,
                "response carried a pseudo-header other than :status",
            ));
        }
    }
    if !is_trailers && status_count != 1 {
        return Err(Error::stream(
            ErrorCode::ProtocolError,
            stream_id,
            "response is missing exactly one :status pseudo-header",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Method, Request};

    fn new_connection() -> ConnectionState {
        ConnectionState::new(Config::default())
    }

    #[test]
    fn submit_allocates_odd_increasing_stream_ids() {
        let mut conn = new_connection();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        let (tx3, _rx3) = oneshot::channel();
        let (id1, _) = conn.submit(Request::get("https", "example.com", "/"), tx1).unwrap();
        let (id2, _) = conn.submit(Request::get("https", "example.com", "/"), tx2).unwrap();
        let (id3, _) = conn.submit(Request::get("https", "example.com", "/"), tx3).unwrap();
        assert_eq!([id1, id2, id3], [1, 3, 5]);
    }

    #[test]
    fn settings_ack_is_generated() {
        let mut conn = new_connection();
        let frames = conn.handle_incoming(Frame::Settings { ack: false, params: Vec::new() }).unwrap();
        assert!(matches!(frames.as_slice(), [Frame::Settings { ack: true, .. }]));
    }

    #[test]
    fn data_for_unknown_stream_is_protocol_error() {
        let mut conn = new_connection();
        let err = conn
            .handle_incoming(Frame::Data {
                stream_id: 99,
                end_stream: true,
                data: Bytes::new(),
                flow_controlled_length: 0,
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn cancel_emits_rst_stream_exactly_once() {
        let mut conn = new_connection();
        let (tx, _rx) = oneshot::channel();
        let (id, _) = conn.submit(Request::get("https", "example.com", "/"), tx).unwrap();
        assert!(conn.cancel(id).is_some());
        assert!(conn.cancel(id).is_none());
    }

    #[test]
    fn data_after_cancel_is_silently_discarded() {
        let mut conn = new_connection();
        let (tx, _rx) = oneshot::channel();
        let (id, _) = conn.submit(Request::get("https", "example.com", "/"), tx).unwrap();
        conn.cancel(id);
        let frames = conn
            .handle_incoming(Frame::Data {
                stream_id: id,
                end_stream: true,
                data: Bytes::from_static(b"late"),
                flow_controlled_length: 4,
            })
            .unwrap();
        assert!(frames.is_empty());
    }

    fn encode_headers(pairs: &[(&str, &str)]) -> Bytes {
        let headers: HeaderList = pairs
            .iter()
            .map(|(n, v)| (Bytes::copy_from_slice(n.as_bytes()), Bytes::copy_from_slice(v.as_bytes())))
            .collect();
        Encoder::new(4096).encode(&headers)
    }

    fn open_get_stream(conn: &mut ConnectionState) -> StreamId {
        let (tx, _rx) = oneshot::channel();
        conn.submit(Request::get("https", "example.com", "/"), tx).unwrap().0
    }

    #[test]
    fn fail_stream_emits_rst_stream_exactly_once() {
        let mut conn = new_connection();
        let id = open_get_stream(&mut conn);
        assert!(conn.fail_stream(id, ErrorCode::FlowControlError, "boom").is_some());
        assert!(conn.fail_stream(id, ErrorCode::FlowControlError, "boom").is_none());
    }

    #[test]
    fn data_after_normal_completion_is_discarded_not_errored() {
        let mut conn = new_connection();
        let id = open_get_stream(&mut conn);
        conn.handle_incoming(Frame::Headers {
            stream_id: id,
            end_stream: true,
            end_headers: true,
            priority: None,
            header_block: encode_headers(&[(":status", "200")]),
        })
        .unwrap();
        let frames = conn
            .handle_incoming(Frame::Data {
                stream_id: id,
                end_stream: true,
                data: Bytes::from_static(b"late"),
                flow_controlled_length: 4,
            })
            .unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn response_missing_status_is_protocol_error() {
        let mut conn = new_connection();
        let id = open_get_stream(&mut conn);
        let err = conn
            .handle_incoming(Frame::Headers {
                stream_id: id,
                end_stream: true,
                end_headers: true,
                priority: None,
                header_block: encode_headers(&[("content-type", "text/plain")]),
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn response_with_disallowed_pseudo_header_is_protocol_error() {
        let mut conn = new_connection();
        let id = open_get_stream(&mut conn);
        let err = conn
            .handle_incoming(Frame::Headers {
                stream_id: id,
                end_stream: true,
                end_headers: true,
                priority: None,
                header_block: encode_headers(&[(":status", "200"), (":path", "/")]),
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn pseudo_header_after_regular_field_is_protocol_error() {
        let mut conn = new_connection();
        let id = open_get_stream(&mut conn);
        let err = conn
            .handle_incoming(Frame::Headers {
                stream_id: id,
                end_stream: true,
                end_headers: true,
                priority: None,
                header_block: encode_headers(&[("content-type", "text/plain"), (":status", "200")]),
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn trailers_with_pseudo_header_is_protocol_error() {
        let mut conn = new_connection();
        let id = open_get_stream(&mut conn);
        conn.handle_incoming(Frame::Headers {
            stream_id: id,
            end_stream: false,
            end_headers: true,
            priority: None,
            header_block: encode_headers(&[(":status", "200")]),
        })
        .unwrap();
        let err = conn
            .handle_incoming(Frame::Headers {
                stream_id: id,
                end_stream: true,
                end_headers: true,
                priority: None,
                header_block: encode_headers(&[(":status", "200")]),
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn local_settings_reflect_config_overrides() {
        let config = Config {
            max_concurrent_streams: 10,
            initial_window_size: 1_000_000,
            max_frame_size: 32_768,
            header_table_size: 8192,
            ..Config::default()
        };
        let conn = ConnectionState::new(config);
        let Frame::Settings { params, .. } = conn.initial_settings_frame() else {
            panic!("expected a SETTINGS frame");
        };
        let value_of = |id: SettingsParameter| {
            params.iter().find(|u| u.identifier == id as u16).map(|u| u.value).unwrap()
        };
        assert_eq!(value_of(SettingsParameter::MaxConcurrentStreams), 10);
        assert_eq!(value_of(SettingsParameter::InitialWindowSize), 1_000_000);
        assert_eq!(value_of(SettingsParameter::MaxFrameSize), 32_768);
        assert_eq!(value_of(SettingsParameter::HeaderTableSize), 8192);
    }
}
