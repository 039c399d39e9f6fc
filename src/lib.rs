#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation, // TODO
    clippy::too_many_lines, // TODO
)]

//! A transport-agnostic RFC 7540/RFC 7541 HTTP/2 client protocol core.
//!
//! This crate owns framing, HPACK, flow control, and the connection/stream
//! state machines. It does not dial TCP, negotiate TLS/ALPN, or provide a
//! convenience `Client` — callers hand [`ProtocolEngine::spawn`] any type
//! that implements [`Transport`] (a plain `AsyncRead + AsyncWrite`) and get
//! back a handle for submitting [`Request`]s and receiving [`Response`]s.

mod connection;
mod engine;
mod error;
mod flags;
mod flow_control;
mod frame;
mod hpack;
mod limits;
mod request;
mod response;
mod stream;
mod transport;
mod types;

pub use bytes::Bytes;
pub use engine::{ProtocolEngine, RequestHandle};
pub use error::{Error, Result};
pub use limits::Config;
pub use request::{Method, Request};
pub use response::Response;
pub use transport::Transport;
pub use types::{ErrorCode, HeaderField, HeaderList, StreamId};
