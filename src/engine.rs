//! The async engine: three tokio tasks (reader, writer, owner) wired
//! together by channels per the single-owner-state design in
//! [`crate::connection::ConnectionState`]. Reader and writer never touch
//! connection state directly; only the owner task does, so there is no
//! `Mutex` anywhere on the hot path.

use crate::connection::ConnectionState;
use crate::error::{Error, Result, Scope};
use crate::frame::Frame;
use crate::limits::Config;
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;
use crate::types::{ErrorCode, StreamId};
use bytes::Bytes;
use log::warn;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{split, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior, Sleep};

/// RFC 7540 §3.5: the client connection preface, sent verbatim before any
/// frames so a server that supports HTTP/2 can fail fast on a misconfigured
/// client.
const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

struct Submission {
    request: Request,
    response_tx: oneshot::Sender<Result<Response>>,
    id_tx: oneshot::Sender<Result<StreamId>>,
}

/// A request in flight. Resolves to the [`Response`] once the stream
/// completes; dropping it before then cancels the stream with
/// `RST_STREAM(CANCEL)`.
pub struct RequestHandle {
    stream_id: StreamId,
    response_rx: oneshot::Receiver<Result<Response>>,
    cancel_tx: mpsc::UnboundedSender<StreamId>,
    deadline: Pin<Box<Sleep>>,
    done: bool,
}

impl Future for RequestHandle {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.response_rx).poll(cx) {
            Poll::Ready(Ok(result)) => {
                self.done = true;
                return Poll::Ready(result);
            }
            Poll::Ready(Err(_)) => {
                self.done = true;
                return Poll::Ready(Err(Error::ConnectionClosed));
            }
            Poll::Pending => {}
        }
        if self.deadline.as_mut().poll(cx).is_ready() {
            self.done = true;
            let _ = self.cancel_tx.send(self.stream_id);
            return Poll::Ready(Err(Error::Timeout));
        }
        Poll::Pending
    }
}

impl RequestHandle {
    /// The HTTP/2 stream id allocated to this request.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.cancel_tx.send(self.stream_id);
        }
    }
}

/// The public handle to a running HTTP/2 connection. Cloning shares the
/// same underlying tasks; dropping every clone lets those tasks exit once
/// any in-flight requests finish.
#[derive(Clone)]
pub struct ProtocolEngine {
    submit_tx: mpsc::Sender<Submission>,
    cancel_tx: mpsc::UnboundedSender<StreamId>,
    request_timeout: Duration,
}

impl ProtocolEngine {
    /// Spawn the reader/writer/owner tasks over `transport` and return a
    /// handle for submitting requests. The connection preface (24-byte
    /// magic plus the opening SETTINGS frame) is written before this
    /// returns control to the owner task's main loop.
    pub fn spawn<T: Transport>(transport: T, config: Config) -> Self {
        let (read_half, write_half) = split(transport);
        let (reader_tx, reader_rx) = mpsc::channel::<Result<Frame>>(64);
        let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>(64);
        let (submit_tx, submit_rx) = mpsc::channel::<Submission>(64);
        let (cancel_tx, cancel_rx) = mpsc::unbounded_channel::<StreamId>();

        let local_max_frame_size = config.max_frame_size;
        let request_timeout = config.request_timeout;
        tokio::spawn(spawn_reader(read_half, reader_tx, local_max_frame_size));
        tokio::spawn(spawn_writer(write_half, writer_rx));
        let idle_timeout = config.connect_timeout;
        tokio::spawn(run_owner(config, reader_rx, submit_rx, cancel_rx, writer_tx, idle_timeout));

        Self { submit_tx, cancel_tx, request_timeout }
    }

    /// Submit a request and return a future resolving to its response.
    /// Dropping the returned handle before it resolves cancels the request.
    pub async fn submit(&self, request: Request) -> Result<RequestHandle> {
        let (response_tx, response_rx) = oneshot::channel();
        let (id_tx, id_rx) = oneshot::channel();
        self.submit_tx
            .send(Submission { request, response_tx, id_tx })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        let stream_id = id_rx.await.map_err(|_| Error::ConnectionClosed)??;
        Ok(RequestHandle {
            stream_id,
            response_rx,
            cancel_tx: self.cancel_tx.clone(),
            deadline: Box::pin(sleep(self.request_timeout)),
            done: false,
        })
    }

    /// Close the connection: the owner task exits once this handle and all
    /// outstanding [`RequestHandle`]s are dropped.
    pub fn close(self) {
        drop(self);
    }
}

async fn spawn_reader<R>(mut reader: R, reader_tx: mpsc::Sender<Result<Frame>>, max_frame_size: u32)
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let outcome = Frame::read_from(&mut reader, max_frame_size).await;
        let is_err = outcome.is_err();
        if reader_tx.send(outcome).await.is_err() || is_err {
            return;
        }
    }
}

async fn spawn_writer<W>(mut writer: W, mut writer_rx: mpsc::Receiver<Vec<u8>>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(buf) = writer_rx.recv().await {
        if writer.write_all(&buf).await.is_err() {
            return;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_owner(
    config: Config,
    mut reader_rx: mpsc::Receiver<Result<Frame>>,
    mut submit_rx: mpsc::Receiver<Submission>,
    mut cancel_rx: mpsc::UnboundedReceiver<StreamId>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    idle_timeout: Duration,
) {
    let mut state = ConnectionState::new(config);

    if writer_tx.send(PREFACE.to_vec()).await.is_err() {
        return;
    }
    if writer_tx
        .send(state.initial_settings_frame().encode().to_vec())
        .await
        .is_err()
    {
        return;
    }

    let mut ping_pending = false;
    let mut idle = interval(idle_timeout);
    idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            outcome = reader_rx.recv() => {
                let Some(outcome) = outcome else { return };
                let frame = match outcome {
                    Ok(frame) => frame,
                    Err(err) => {
                        match err.scope() {
                            Some(Scope::Stream(stream_id)) => {
                                if !fail_stream(&mut state, &writer_tx, stream_id, &err).await {
                                    return;
                                }
                                continue;
                            }
                            _ => {
                                match err.code() {
                                    Some(code) => terminate(&mut state, &writer_tx, code, &err.to_string()).await,
                                    None => {
                                        warn!("transport read failed, closing without GOAWAY: {err}");
                                        state.fail_all(ErrorCode::InternalError, &err.to_string());
                                    }
                                }
                                return;
                            }
                        }
                    }
                };
                if matches!(frame, Frame::Ping { ack: true, .. }) {
                    ping_pending = false;
                }
                match state.handle_incoming(frame) {
                    Ok(frames) => {
                        if !send_all(&writer_tx, frames).await {
                            return;
                        }
                    }
                    Err(err) => match err.scope() {
                        Some(Scope::Stream(stream_id)) => {
                            if !fail_stream(&mut state, &writer_tx, stream_id, &err).await {
                                return;
                            }
                        }
                        _ => {
                            let code = err.code().unwrap_or(ErrorCode::InternalError);
                            terminate(&mut state, &writer_tx, code, &err.to_string()).await;
                            return;
                        }
                    },
                }
                if let Ok(frames) = state.drain_writable() {
                    if !send_all(&writer_tx, frames).await {
                        return;
                    }
                }
                idle.reset();
            }
            submission = submit_rx.recv() => {
                let Some(Submission { request, response_tx, id_tx }) = submission else { return };
                match state.submit(request, response_tx) {
                    Ok((stream_id, frames)) => {
                        let _ = id_tx.send(Ok(stream_id));
                        if !send_all(&writer_tx, frames).await {
                            return;
                        }
                        if let Ok(frames) = state.drain_writable() {
                            if !send_all(&writer_tx, frames).await {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!("request rejected: {err}");
                        let _ = id_tx.send(Err(err));
                    }
                }
                idle.reset();
            }
            stream_id = cancel_rx.recv() => {
                let Some(stream_id) = stream_id else { continue };
                if let Some(frame) = state.cancel(stream_id) {
                    let _ = writer_tx.send(frame.encode().to_vec()).await;
                }
            }
            _ = idle.tick() => {
                if ping_pending {
                    terminate(
                        &mut state,
                        &writer_tx,
                        ErrorCode::NoError,
                        "idle keepalive PING went unacknowledged",
                    ).await;
                    return;
                }
                ping_pending = true;
                let ping = Frame::Ping { ack: false, data: *b"keepaliv" };
                if writer_tx.send(ping.encode().to_vec()).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Tear down the connection: fail every open stream with `code`/`message` so
/// callers observe the real reason rather than a generic closed-connection
/// error, then send a best-effort GOAWAY.
async fn terminate(state: &mut ConnectionState, writer_tx: &mpsc::Sender<Vec<u8>>, code: ErrorCode, message: &str) {
    warn!("terminating connection: {code:?} {message}");
    state.fail_all(code, message);
    let goaway = Frame::GoAway {
        last_stream_id: 0,
        error_code: code,
        debug_data: Bytes::new(),
    };
    state.mark_goaway_sent();
    let _ = writer_tx.send(goaway.encode().to_vec()).await;
}

/// Handle a stream-scoped error: emit RST_STREAM for just that stream and
/// fail its response channel, leaving every other stream on the connection
/// untouched. Returns `false` if the writer is gone and the owner loop
/// should exit.
async fn fail_stream(state: &mut ConnectionState, writer_tx: &mpsc::Sender<Vec<u8>>, stream_id: StreamId, err: &Error) -> bool {
    warn!("failing stream {stream_id}: {err}");
    let code = err.code().unwrap_or(ErrorCode::InternalError);
    if let Some(frame) = state.fail_stream(stream_id, code, &err.to_string()) {
        if writer_tx.send(frame.encode().to_vec()).await.is_err() {
            return false;
        }
    }
    true
}

async fn send_all(writer_tx: &mpsc::Sender<Vec<u8>>, frames: Vec<Frame>) -> bool {
    for frame in frames {
        if writer_tx.send(frame.encode().to_vec()).await.is_err() {
            return false;
        }
    }
    true
}
