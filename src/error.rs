//! Typed error surface for the engine, mapped onto RFC 7540 §7 wire error codes.
//!
//! Connection errors terminate every stream and drain the connection with a
//! GOAWAY; stream errors terminate only the named stream via RST_STREAM and
//! leave the connection otherwise healthy. Transport failures and deadline
//! exhaustion never cross the wire but are scoped the same way callers expect
//! protocol errors to be scoped.

use crate::types::{ErrorCode, StreamId};
use std::fmt;

/// Whether an error terminates the whole connection or a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Connection,
    Stream(StreamId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Connection => write!(f, "connection"),
            Scope::Stream(id) => write!(f, "stream {id}"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A protocol violation or other RFC 7540 §7 condition, scoped to the
    /// connection or a single stream.
    #[error("{scope} error {code:?}: {message}")]
    Protocol {
        code: ErrorCode,
        scope: Scope,
        message: String,
    },

    /// The byte transport failed (read/write error, unexpected EOF mid-frame).
    /// Treated as a connection failure with no GOAWAY since the transport is
    /// presumed gone.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// A header block could not be decoded; per RFC 7541 §4.3 this always
    /// terminates the connection since the HPACK state machine has lost
    /// synchronization with the peer's encoder.
    #[error("HPACK error: {0}")]
    Hpack(#[from] crate::hpack::HpackError),

    /// The connection already terminated; no further operations are possible.
    #[error("connection is closed")]
    ConnectionClosed,

    /// A caller-supplied deadline elapsed before the response completed.
    #[error("request timed out")]
    Timeout,

    /// The caller abandoned the request before it completed.
    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Protocol {
            code,
            scope: Scope::Connection,
            message: message.into(),
        }
    }

    pub fn stream(code: ErrorCode, stream_id: StreamId, message: impl Into<String>) -> Self {
        Error::Protocol {
            code,
            scope: Scope::Stream(stream_id),
            message: message.into(),
        }
    }

    /// The RFC 7540 §7 wire code this error would be sent with, if any.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Protocol { code, .. } => Some(*code),
            Error::Cancelled | Error::Timeout => Some(ErrorCode::Cancel),
            Error::Hpack(_) => Some(ErrorCode::CompressionError),
            _ => None,
        }
    }

    #[must_use]
    pub fn scope(&self) -> Option<Scope> {
        match self {
            Error::Protocol { scope, .. } => Some(*scope),
            Error::Hpack(_) => Some(Scope::Connection),
            _ => None,
        }
    }

    /// Safe-to-retry-on-a-new-connection errors: REFUSED_STREAM and any
    /// failure of the transport itself.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Protocol {
                code: ErrorCode::RefusedStream,
                ..
            } | Error::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
