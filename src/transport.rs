//! The byte-stream boundary this crate runs over. Any full-duplex async
//! stream qualifies — a TCP socket, a TLS session, an in-memory
//! `tokio::io::DuplexStream` for tests — the engine never constructs or
//! configures the transport itself.

use tokio::io::{AsyncRead, AsyncWrite};

/// Blanket bound for anything the engine can read frames from and write
/// frames to. Implemented automatically for every type that satisfies it.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
