//! Shared wire-level types: stream identifiers, settings parameters and the
//! RFC 7540 §7 error code table.

use num_derive::{FromPrimitive, ToPrimitive};
use std::num::NonZeroU32;

/// Largest value representable in the 31-bit fields used for stream ids and
/// flow-control windows.
pub const U31_MAX: u32 = u32::MAX >> 1;

pub type StreamId = u32;
pub type NonZeroStreamId = NonZeroU32;

/// An ordered (name, value) header pair. Names are expected to already be
/// lowercase ASCII per RFC 7540 §8.1.2 by the time they reach the codec.
pub type HeaderField = (bytes::Bytes, bytes::Bytes);
pub type HeaderList = Vec<HeaderField>;

/// https://httpwg.org/specs/rfc7540.html#FrameTypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    ResetStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

/// https://httpwg.org/specs/rfc7540.html#ErrorCodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
    /// The associated condition is not a result of an error, e.g. graceful shutdown.
    NoError = 0x0,
    /// The endpoint detected an unspecific protocol error.
    ProtocolError = 0x1,
    /// The endpoint encountered an unexpected internal error.
    InternalError = 0x2,
    /// The endpoint detected that its peer violated the flow-control protocol.
    FlowControlError = 0x3,
    /// The endpoint sent a SETTINGS frame but did not receive a response in a timely manner.
    SettingsTimeout = 0x4,
    /// The endpoint received a frame after a stream was half-closed.
    StreamClosed = 0x5,
    /// The endpoint received a frame with an invalid size.
    FrameSizeError = 0x6,
    /// The endpoint refused the stream prior to performing any application processing.
    RefusedStream = 0x7,
    /// Used by the endpoint to indicate that the stream is no longer needed.
    Cancel = 0x8,
    /// The endpoint is unable to maintain the header compression context for the connection.
    CompressionError = 0x9,
    /// The connection established in response to a CONNECT request was reset or abnormally closed.
    ConnectError = 0xa,
    /// The endpoint detected that its peer might be generating excessive load.
    EnhanceYourCalm = 0xb,
    /// The underlying transport has properties that do not meet minimum security requirements.
    InadequateSecurity = 0xc,
    /// The endpoint requires that HTTP/1.1 be used instead of HTTP/2.
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Unknown wire values collapse to INTERNAL_ERROR; RFC 7540 does not define a
    /// reserved "unknown" code and receivers must still be able to react to one.
    #[must_use]
    pub fn from_wire(value: u32) -> Self {
        num_traits::FromPrimitive::from_u32(value).unwrap_or(ErrorCode::InternalError)
    }
}

/// https://httpwg.org/specs/rfc7540.html#SettingValues
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive, enum_map::Enum,
)]
#[repr(u16)]
pub enum SettingsParameter {
    /// Maximum size of the header compression table used to decode header blocks, in octets.
    HeaderTableSize = 0x1,
    /// Disables (0) or allows (1) server push.
    EnablePush = 0x2,
    /// Maximum number of concurrent streams the sender will allow.
    MaxConcurrentStreams = 0x3,
    /// Sender's initial window size (in octets) for stream-level flow control.
    InitialWindowSize = 0x4,
    /// Size of the largest frame payload the sender is willing to receive, in octets.
    MaxFrameSize = 0x5,
    /// Maximum size of header list that the sender is prepared to accept, in octets.
    MaxHeaderListSize = 0x6,
}
