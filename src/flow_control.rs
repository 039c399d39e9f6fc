//! RFC 7540 §5.2/§6.9 flow control: independent send/receive windows at
//! connection and stream scope. [`Window`] is the primitive the connection
//! and stream state machines hold one of each for; [`FlowControlManager`]
//! owns only the connection-scoped pair and the operations that need to
//! reason about both scopes together.

use crate::error::{Error, Result};
use crate::types::{ErrorCode, StreamId, U31_MAX};

/// Which window an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Connection,
    Stream(StreamId),
}

/// A single flow-control window. Signed so that a negative-going
/// SETTINGS_INITIAL_WINDOW_SIZE change (RFC 7540 §6.9.2) can be represented
/// without clamping, per the RFC's explicit allowance for this.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    value: i64,
    initial: u32,
}

impl Window {
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Self {
            value: i64::from(initial),
            initial,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.value
    }

    fn consume(&mut self, n: u32) -> std::result::Result<(), ()> {
        let next = self.value - i64::from(n);
        if next < 0 {
            return Err(());
        }
        self.value = next;
        Ok(())
    }

    fn increment(&mut self, increment: u32) -> std::result::Result<(), ()> {
        let next = self.value + i64::from(increment);
        if next > i64::from(U31_MAX) {
            return Err(());
        }
        self.value = next;
        Ok(())
    }

    /// Applies a SETTINGS_INITIAL_WINDOW_SIZE change (RFC 7540 §6.9.2): the
    /// delta between the old and new advertised initial value is added to
    /// every stream's current window, which may legitimately drive it
    /// negative but must not overflow past 2^31-1.
    pub fn apply_initial_window_delta(&mut self, delta: i64) -> std::result::Result<(), ()> {
        let next = self.value + delta;
        if next > i64::from(U31_MAX) {
            return Err(());
        }
        self.value = next;
        Ok(())
    }

    /// True once the window has dropped to at most half its initial size,
    /// the threshold at which a WINDOW_UPDATE should be scheduled.
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.value <= i64::from(self.initial) / 2
    }

    /// The increment needed to restore the window to its initial size.
    #[must_use]
    pub fn update_increment(&self) -> u32 {
        (i64::from(self.initial) - self.value).max(0) as u32
    }

    /// Grant ourselves `n` bytes of additional receive credit after sending
    /// a WINDOW_UPDATE restoring our own advertised window. Unlike
    /// [`Window::increment`] this is infallible: the caller derives `n` from
    /// [`Window::update_increment`], which never exceeds what is needed to
    /// reach `initial`.
    pub fn grant_receive_credit(&mut self, n: u32) {
        self.value = (self.value + i64::from(n)).min(i64::from(self.initial));
    }
}

/// Owns the connection-scoped send/receive windows. Stream-scoped windows
/// live on [`crate::stream::Stream`] and are passed in by the caller, which
/// already has them borrowed from its stream map.
pub struct FlowControlManager {
    connection_send: Window,
    connection_recv: Window,
}

impl FlowControlManager {
    #[must_use]
    pub fn new(local_initial_window_size: u32, peer_initial_window_size: u32) -> Self {
        Self {
            connection_send: Window::new(peer_initial_window_size),
            connection_recv: Window::new(local_initial_window_size),
        }
    }

    #[must_use]
    pub fn connection_send(&self) -> &Window {
        &self.connection_send
    }

    #[must_use]
    pub fn connection_recv(&self) -> &Window {
        &self.connection_recv
    }

    #[must_use]
    pub fn connection_recv_mut(&mut self) -> &mut Window {
        &mut self.connection_recv
    }

    /// Accounts for `n` bytes (including any padding and the pad-length
    /// byte) being written as DATA on `stream_send` and the connection.
    /// Refuses rather than letting either window go negative.
    pub fn on_data_sent(&mut self, stream_send: &mut Window, n: u32) -> Result<()> {
        if stream_send.consume(n).is_err() || self.connection_send.consume(n).is_err() {
            return Err(Error::protocol(
                ErrorCode::FlowControlError,
                "attempted to send more DATA than the flow-control window allows",
            ));
        }
        Ok(())
    }

    /// Accounts for `n` bytes of DATA received on `stream_id`/`stream_recv`.
    /// A stream-scoped violation is a stream error; a connection-scoped one
    /// is a connection error, per RFC 7540 §6.9.1.
    pub fn on_data_received(
        &mut self,
        stream_id: StreamId,
        stream_recv: &mut Window,
        n: u32,
    ) -> Result<()> {
        if stream_recv.consume(n).is_err() {
            return Err(Error::stream(
                ErrorCode::FlowControlError,
                stream_id,
                "peer sent more DATA than the stream's receive window allows",
            ));
        }
        if self.connection_recv.consume(n).is_err() {
            return Err(Error::protocol(
                ErrorCode::FlowControlError,
                "peer sent more DATA than the connection's receive window allows",
            ));
        }
        Ok(())
    }

    /// Applies a received WINDOW_UPDATE. `increment` of zero and overflow
    /// past 2^31-1 are both errors, scoped per RFC 7540 §6.9.
    pub fn on_window_update(
        &mut self,
        scope: Scope,
        increment: u32,
        stream_send: Option<&mut Window>,
    ) -> Result<()> {
        if increment == 0 {
            return Err(match scope {
                Scope::Connection => Error::protocol(
                    ErrorCode::ProtocolError,
                    "WINDOW_UPDATE with a zero increment on the connection",
                ),
                Scope::Stream(id) => Error::stream(
                    ErrorCode::ProtocolError,
                    id,
                    "WINDOW_UPDATE with a zero increment",
                ),
            });
        }
        match scope {
            Scope::Connection => self.connection_send.increment(increment).map_err(|()| {
                Error::protocol(
                    ErrorCode::FlowControlError,
                    "connection send window overflowed 2^31-1",
                )
            }),
            Scope::Stream(id) => {
                let window = stream_send.expect("caller must supply the stream's window");
                window.increment(increment).map_err(|()| {
                    Error::stream(
                        ErrorCode::FlowControlError,
                        id,
                        "stream send window overflowed 2^31-1",
                    )
                })
            }
        }
    }
}
