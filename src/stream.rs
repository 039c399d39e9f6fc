//! RFC 7540 §5.1 per-stream state machine plus the buffering a single stream
//! owns: flow-control windows, in-progress header-block bytes while waiting
//! for END_HEADERS, and the accumulated response delivered to the caller.

use crate::error::{Error, Result};
use crate::flow_control::Window;
use crate::frame::Priority;
use crate::response::Response;
use crate::types::{ErrorCode, FrameType, HeaderList, StreamId};
use bytes::{Bytes, BytesMut};
use log::trace;
use tokio::sync::oneshot;

/// https://httpwg.org/specs/rfc7540.html#StreamStates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// One stream's mutable state, owned exclusively by the connection task per
/// the single-owner-state design (no `Mutex`, no shared access). Which kind
/// of header block (HEADERS vs PUSH_PROMISE) a run of CONTINUATION frames
/// extends is tracked by the connection, not here — this just accumulates
/// bytes until `END_HEADERS`.
pub struct Stream {
    pub id: StreamId,
    pub state: StreamState,
    pub send_window: Window,
    pub recv_window: Window,
    pub priority: Priority,
    accumulating_headers: bool,
    header_block: BytesMut,
    pub response_headers: HeaderList,
    pub trailers: Option<HeaderList>,
    pub body: BytesMut,
    pub pending_body: BytesMut,
    pub pending_trailers: Option<HeaderList>,
    response_tx: Option<oneshot::Sender<Result<Response>>>,
}

impl Stream {
    #[must_use]
    pub fn new(
        id: StreamId,
        send_window: Window,
        recv_window: Window,
        response_tx: oneshot::Sender<Result<Response>>,
    ) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            send_window,
            recv_window,
            priority: Priority::default(),
            accumulating_headers: false,
            header_block: BytesMut::new(),
            response_headers: HeaderList::new(),
            trailers: None,
            body: BytesMut::new(),
            pending_body: BytesMut::new(),
            pending_trailers: None,
            response_tx: Some(response_tx),
        }
    }

    /// Queue the full request body (and optional trailers) to be flushed as
    /// DATA frames by the writer once flow-control window allows.
    pub fn queue_body(&mut self, body: Bytes, trailers: Option<HeaderList>) {
        self.pending_body.extend_from_slice(&body);
        self.pending_trailers = trailers;
    }

    /// Take the next DATA chunk to send, up to `max_len` bytes. The returned
    /// `bool` is whether this chunk should carry END_STREAM.
    pub fn drain_body(&mut self, max_len: usize) -> Option<(Bytes, bool)> {
        if self.pending_body.is_empty() {
            return None;
        }
        let take = max_len.min(self.pending_body.len());
        let chunk = self.pending_body.split_to(take).freeze();
        let end_stream = self.pending_body.is_empty() && self.pending_trailers.is_none();
        Some((chunk, end_stream))
    }

    /// Once the body is fully drained, take any trailers queued to follow it.
    pub fn take_pending_trailers(&mut self) -> Option<HeaderList> {
        if self.pending_body.is_empty() {
            self.pending_trailers.take()
        } else {
            None
        }
    }

    #[must_use]
    pub fn has_pending_write(&self) -> bool {
        !self.pending_body.is_empty() || self.pending_trailers.is_some()
    }

    fn protocol_error(&self, message: &'static str) -> Error {
        Error::protocol(ErrorCode::ProtocolError, message)
    }

    fn stream_error(&self, code: ErrorCode, message: &'static str) -> Error {
        Error::stream(code, self.id, message)
    }

    /// Apply a frame this side is about to send, per the abbreviated client
    /// transition table: Idle -S HEADERS-> Open (or HalfClosedLocal if
    /// END_STREAM), Open -S HEADERS/DATA(END_STREAM)-> HalfClosedLocal,
    /// HalfClosedRemote -S HEADERS/DATA(END_STREAM)-> Closed.
    pub fn on_send(&mut self, frame_type: FrameType, end_stream: bool) -> Result<()> {
        let before = self.state;
        match (self.state, frame_type) {
            (StreamState::Idle, FrameType::Headers) => {
                self.state = if end_stream {
                    StreamState::HalfClosedLocal
                } else {
                    StreamState::Open
                };
            }
            (StreamState::Open, FrameType::Headers | FrameType::Data) if end_stream => {
                self.state = StreamState::HalfClosedLocal;
            }
            (StreamState::HalfClosedRemote, FrameType::Headers | FrameType::Data) if end_stream => {
                self.state = StreamState::Closed;
            }
            (StreamState::ReservedLocal, FrameType::Headers) => {
                self.state = StreamState::HalfClosedRemote;
            }
            (StreamState::Closed, _) => {
                return Err(self.stream_error(ErrorCode::StreamClosed, "send on a closed stream"));
            }
            _ => {}
        }
        if self.state != before {
            trace!("stream {} send {:?} -> {:?}", self.id, before, self.state);
        }
        Ok(())
    }

    /// Apply a frame received from the peer. `push_enabled` gates whether
    /// Idle -R PUSH_PROMISE-> ReservedRemote is legal at all.
    pub fn on_recv(
        &mut self,
        frame_type: FrameType,
        end_stream: bool,
        push_enabled: bool,
    ) -> Result<()> {
        let before = self.state;
        match (self.state, frame_type) {
            (StreamState::Idle, FrameType::Headers) => {
                self.state = if end_stream {
                    StreamState::HalfClosedRemote
                } else {
                    StreamState::Open
                };
            }
            (StreamState::Idle, FrameType::PushPromise) => {
                if !push_enabled {
                    return Err(self.protocol_error("PUSH_PROMISE received with push disabled"));
                }
                self.state = StreamState::ReservedRemote;
            }
            (StreamState::Idle, FrameType::Priority) => {}
            (StreamState::Idle, _) => {
                return Err(self.protocol_error(
                    "stream in Idle state received a frame other than HEADERS/PRIORITY/PUSH_PROMISE",
                ));
            }
            (StreamState::ReservedRemote, FrameType::Headers) => {
                self.state = StreamState::HalfClosedLocal;
            }
            (StreamState::Open, FrameType::Headers | FrameType::Data) if end_stream => {
                self.state = StreamState::HalfClosedRemote;
            }
            (StreamState::HalfClosedLocal, FrameType::Headers | FrameType::Data) if end_stream => {
                self.state = StreamState::Closed;
            }
            (StreamState::HalfClosedRemote, FrameType::Data | FrameType::Headers | FrameType::Continuation) => {
                return Err(self.stream_error(
                    ErrorCode::StreamClosed,
                    "HalfClosedRemote stream received DATA/HEADERS/CONTINUATION",
                ));
            }
            (StreamState::Closed, FrameType::Data | FrameType::Headers | FrameType::Continuation) => {
                return Err(self.stream_error(
                    ErrorCode::StreamClosed,
                    "closed stream received DATA/HEADERS/CONTINUATION",
                ));
            }
            _ => {}
        }
        if self.state != before {
            trace!("stream {} recv {:?} -> {:?}", self.id, before, self.state);
        }
        Ok(())
    }

    /// Apply RST_STREAM from either direction: terminal from any
    /// non-terminal state, but a PROTOCOL_ERROR if received while Idle (no
    /// stream to reset).
    pub fn on_reset(&mut self, received: bool) -> Result<()> {
        if received && self.state == StreamState::Idle {
            return Err(self.protocol_error("RST_STREAM received for an idle stream"));
        }
        self.state = StreamState::Closed;
        Ok(())
    }

    /// Start a new header block (from a HEADERS or PUSH_PROMISE frame).
    /// Returns the complete block immediately if `end_headers` is set.
    pub fn start_header_block(&mut self, fragment: &[u8], end_headers: bool) -> Result<Option<Bytes>> {
        if self.accumulating_headers {
            return Err(self.protocol_error(
                "a new header block started while another was still awaiting END_HEADERS",
            ));
        }
        self.header_block.clear();
        self.accumulating_headers = !end_headers;
        self.header_block.extend_from_slice(fragment);
        if end_headers {
            Ok(Some(self.header_block.split().freeze()))
        } else {
            Ok(None)
        }
    }

    /// Extend the in-progress header block with a CONTINUATION fragment.
    pub fn continue_header_block(&mut self, fragment: &[u8], end_headers: bool) -> Result<Option<Bytes>> {
        if !self.accumulating_headers {
            return Err(self.protocol_error("CONTINUATION received without a preceding header block"));
        }
        self.header_block.extend_from_slice(fragment);
        if end_headers {
            self.accumulating_headers = false;
            Ok(Some(self.header_block.split().freeze()))
        } else {
            Ok(None)
        }
    }

    #[must_use]
    pub fn is_accumulating_headers(&self) -> bool {
        self.accumulating_headers
    }

    /// Deliver the final response to the caller, if anyone is still
    /// listening. Safe to call multiple times; only the first send lands.
    pub fn complete(&mut self) {
        if let Some(tx) = self.response_tx.take() {
            let response = Response {
                status: status_from_headers(&self.response_headers),
                headers: std::mem::take(&mut self.response_headers),
                body: self.body.split().freeze(),
                trailers: self.trailers.take(),
                protocol: "HTTP/2",
            };
            trace!("stream {} complete: status {}", self.id, response.status);
            let _ = tx.send(Ok(response));
        }
    }

    /// Deliver a terminal error to the caller instead of a response.
    pub fn fail(&mut self, error: Error) {
        if let Some(tx) = self.response_tx.take() {
            trace!("stream {} failed: {error}", self.id);
            let _ = tx.send(Err(error));
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state == StreamState::Closed
    }
}

fn status_from_headers(headers: &HeaderList) -> u16 {
    headers
        .iter()
        .find(|(name, _)| name.as_ref() == b":status")
        .and_then(|(_, value)| std::str::from_utf8(value).ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_stream(id: StreamId) -> (Stream, oneshot::Receiver<Result<Response>>) {
        let (tx, rx) = oneshot::channel();
        (
            Stream::new(id, Window::new(65_535), Window::new(65_535), tx),
            rx,
        )
    }

    #[test]
    fn send_headers_without_end_stream_opens() {
        let (mut stream, _rx) = new_stream(1);
        stream.on_send(FrameType::Headers, false).unwrap();
        assert_eq!(stream.state, StreamState::Open);
    }

    #[test]
    fn send_headers_with_end_stream_half_closes_local() {
        let (mut stream, _rx) = new_stream(1);
        stream.on_send(FrameType::Headers, true).unwrap();
        assert_eq!(stream.state, StreamState::HalfClosedLocal);
    }

    #[test]
    fn recv_after_send_end_stream_closes() {
        let (mut stream, _rx) = new_stream(1);
        stream.on_send(FrameType::Headers, false).unwrap();
        stream.on_recv(FrameType::Headers, true, false).unwrap();
        assert_eq!(stream.state, StreamState::HalfClosedRemote);
        stream.on_send(FrameType::Data, true).unwrap();
        assert_eq!(stream.state, StreamState::Closed);
    }

    #[test]
    fn idle_receiving_data_is_protocol_error() {
        let (mut stream, _rx) = new_stream(1);
        let err = stream.on_recv(FrameType::Data, false, false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn half_closed_remote_receiving_data_is_stream_closed() {
        let (mut stream, _rx) = new_stream(1);
        stream.on_send(FrameType::Headers, false).unwrap();
        stream.on_recv(FrameType::Headers, true, false).unwrap();
        let err = stream.on_recv(FrameType::Data, false, false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::StreamClosed));
    }

    #[test]
    fn header_block_spans_continuation_frames() {
        let (mut stream, _rx) = new_stream(1);
        let first = stream.start_header_block(b"abc", false).unwrap();
        assert!(first.is_none());
        assert!(stream.is_accumulating_headers());
        let second = stream.continue_header_block(b"def", true).unwrap();
        assert_eq!(second, Some(Bytes::from_static(b"abcdef")));
        assert!(!stream.is_accumulating_headers());
    }

    #[test]
    fn body_drains_in_window_sized_chunks_then_trailers() {
        let (mut stream, _rx) = new_stream(1);
        let mut trailers = HeaderList::new();
        trailers.push((Bytes::from_static(b"x-trailer"), Bytes::from_static(b"1")));
        stream.queue_body(Bytes::from_static(b"hello world"), Some(trailers));
        let (chunk, end_stream) = stream.drain_body(5).unwrap();
        assert_eq!(&chunk[..], b"hello");
        assert!(!end_stream);
        assert!(stream.take_pending_trailers().is_none());
        let (chunk, end_stream) = stream.drain_body(100).unwrap();
        assert_eq!(&chunk[..], b" world");
        assert!(!end_stream); // trailers still pending
        assert!(stream.take_pending_trailers().is_some());
    }

    #[test]
    fn status_parsed_from_pseudo_header() {
        let mut headers = HeaderList::new();
        headers.push((Bytes::from_static(b":status"), Bytes::from_static(b"200")));
        assert_eq!(status_from_headers(&headers), 200);
    }
}
