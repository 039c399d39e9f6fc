//! End-to-end tests driving [`h2_core::ProtocolEngine`] over an in-memory
//! duplex stream standing in for a real socket, with the test itself playing
//! the peer.

mod common;

use common::{
    complete_client_preamble, encode_frame, hpack_indexed, hpack_literal_new_name, pair,
    read_frame, settings_frame, window_update_frame, ERROR_CODE_CANCEL, ERROR_CODE_COMPRESSION,
    ERROR_CODE_FRAME_SIZE, ERROR_CODE_PROTOCOL, FLAG_END_HEADERS, FLAG_END_STREAM, TYPE_DATA,
    TYPE_GOAWAY, TYPE_HEADERS, TYPE_RST_STREAM, TYPE_SETTINGS,
};
use h2_core::{Config, ErrorCode, ProtocolEngine, Request};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn get_round_trip_returns_status_and_body() {
    let (client_io, mut peer) = pair();
    let engine = ProtocolEngine::spawn(client_io, Config::default());

    complete_client_preamble(&mut peer).await;
    peer.write_all(&settings_frame(&[])).await.unwrap();

    let ack = read_frame(&mut peer).await;
    assert_eq!(ack.frame_type, TYPE_SETTINGS);
    assert_ne!(ack.flags & 0x1, 0, "engine must ack the peer's SETTINGS");

    let handle = engine
        .submit(Request::get("https", "example.com", "/"))
        .await
        .unwrap();

    let headers = read_frame(&mut peer).await;
    assert_eq!(headers.frame_type, TYPE_HEADERS);
    assert_eq!(headers.stream_id, 1);
    assert_ne!(headers.flags & FLAG_END_STREAM, 0, "GET with no body ends the stream immediately");

    let mut status_block = Vec::new();
    status_block.extend_from_slice(&hpack_indexed(8)); // :status: 200
    peer.write_all(&encode_frame(TYPE_HEADERS, FLAG_END_HEADERS, 1, &status_block))
        .await
        .unwrap();
    peer.write_all(&encode_frame(TYPE_DATA, FLAG_END_STREAM, 1, b"OK"))
        .await
        .unwrap();

    let response = handle.await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"OK");
    assert_eq!(response.protocol, "HTTP/2");
}

#[tokio::test]
async fn stream_ids_are_allocated_odd_and_increasing() {
    let (client_io, mut peer) = pair();
    let engine = ProtocolEngine::spawn(client_io, Config::default());
    complete_client_preamble(&mut peer).await;

    let h1 = engine.submit(Request::get("https", "example.com", "/a")).await.unwrap();
    let h2 = engine.submit(Request::get("https", "example.com", "/b")).await.unwrap();
    let h3 = engine.submit(Request::get("https", "example.com", "/c")).await.unwrap();

    assert_eq!([h1.stream_id(), h2.stream_id(), h3.stream_id()], [1, 3, 5]);
}

#[tokio::test]
async fn oversized_frame_terminates_connection_with_frame_size_error() {
    let (client_io, mut peer) = pair();
    let engine = ProtocolEngine::spawn(client_io, Config::default());
    complete_client_preamble(&mut peer).await;

    let handle = engine
        .submit(Request::get("https", "example.com", "/"))
        .await
        .unwrap();
    let _headers = read_frame(&mut peer).await;

    // A bare 9-byte header declaring a length beyond MAX_FRAME_SIZE (16384)
    // is rejected before the engine even tries to read the payload.
    let mut oversized_header = Vec::new();
    oversized_header.extend_from_slice(&16_385u32.to_be_bytes()[1..]);
    oversized_header.push(TYPE_DATA);
    oversized_header.push(0);
    oversized_header.extend_from_slice(&1u32.to_be_bytes());
    peer.write_all(&oversized_header).await.unwrap();

    let err = handle.await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::FrameSizeError));

    let goaway = read_frame(&mut peer).await;
    assert_eq!(goaway.frame_type, TYPE_GOAWAY);
    let error_code = u32::from_be_bytes(goaway.payload[4..8].try_into().unwrap());
    assert_eq!(error_code, ERROR_CODE_FRAME_SIZE);
}

#[tokio::test]
async fn hpack_bomb_terminates_connection_with_compression_error() {
    let (client_io, mut peer) = pair();
    let engine = ProtocolEngine::spawn(client_io, Config::default());
    complete_client_preamble(&mut peer).await;

    let handle = engine
        .submit(Request::get("https", "example.com", "/"))
        .await
        .unwrap();
    let _headers = read_frame(&mut peer).await;

    // Five headers, each within the per-value length limit (8192) but
    // together exceeding max_header_list_size (32768 by default) once the
    // RFC 7541 §4.1 per-entry overhead is added.
    let value = vec![b'a'; 8_000];
    let mut block = Vec::new();
    for i in 0..5 {
        block.extend_from_slice(&hpack_literal_new_name(format!("x-{i}").as_bytes(), &value));
    }
    peer.write_all(&encode_frame(TYPE_HEADERS, FLAG_END_HEADERS | FLAG_END_STREAM, 1, &block))
        .await
        .unwrap();

    let err = handle.await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::CompressionError));

    let goaway = read_frame(&mut peer).await;
    assert_eq!(goaway.frame_type, TYPE_GOAWAY);
    let error_code = u32::from_be_bytes(goaway.payload[4..8].try_into().unwrap());
    assert_eq!(error_code, ERROR_CODE_COMPRESSION);
}

#[tokio::test]
async fn body_pauses_on_empty_window_and_resumes_after_window_update() {
    let (client_io, mut peer) = pair();
    let engine = ProtocolEngine::spawn(client_io, Config::default());
    complete_client_preamble(&mut peer).await;

    peer.write_all(&settings_frame(&[(0x4, 100)])).await.unwrap();
    let ack = read_frame(&mut peer).await;
    assert_eq!(ack.frame_type, TYPE_SETTINGS);
    assert_ne!(ack.flags & 0x1, 0);

    let body = vec![b'x'; 300];
    let handle = engine
        .submit(
            Request::post("https", "example.com", "/upload", body.clone())
                .header("content-type", "application/octet-stream"),
        )
        .await
        .unwrap();

    let _headers = read_frame(&mut peer).await;

    let first_chunk = read_frame(&mut peer).await;
    assert_eq!(first_chunk.frame_type, TYPE_DATA);
    assert_eq!(first_chunk.payload.len(), 100);
    assert_eq!(first_chunk.flags & FLAG_END_STREAM, 0, "writer must pause once the window is exhausted");

    peer.write_all(&window_update_frame(1, 200)).await.unwrap();
    peer.write_all(&window_update_frame(0, 200)).await.unwrap();

    let second_chunk = read_frame(&mut peer).await;
    assert_eq!(second_chunk.frame_type, TYPE_DATA);
    assert_eq!(second_chunk.payload.len(), 200);
    assert_ne!(second_chunk.flags & FLAG_END_STREAM, 0);
    assert_eq!(&first_chunk.payload[..], &body[..100]);
    assert_eq!(&second_chunk.payload[..], &body[100..]);
}

#[tokio::test]
async fn dropping_a_request_sends_rst_stream_exactly_once() {
    let (client_io, mut peer) = pair();
    let engine = ProtocolEngine::spawn(client_io, Config::default());
    complete_client_preamble(&mut peer).await;

    let handle = engine
        .submit(Request::get("https", "example.com", "/"))
        .await
        .unwrap();
    let headers = read_frame(&mut peer).await;
    assert_eq!(headers.stream_id, 1);

    drop(handle);

    let rst = read_frame(&mut peer).await;
    assert_eq!(rst.frame_type, TYPE_RST_STREAM);
    assert_eq!(rst.stream_id, 1);
    let error_code = u32::from_be_bytes(rst.payload[..4].try_into().unwrap());
    assert_eq!(error_code, ERROR_CODE_CANCEL);

    // A DATA frame that arrives for the now-cancelled stream is discarded
    // rather than treated as a protocol error.
    peer.write_all(&encode_frame(TYPE_DATA, FLAG_END_STREAM, 1, b"late"))
        .await
        .unwrap();

    // The connection is still healthy: a fresh request gets the next odd
    // stream id and the only frame waiting for us is its HEADERS, not a
    // second RST_STREAM or a GOAWAY.
    let handle2 = engine
        .submit(Request::get("https", "example.com", "/again"))
        .await
        .unwrap();
    assert_eq!(handle2.stream_id(), 3);
    let headers2 = read_frame(&mut peer).await;
    assert_eq!(headers2.frame_type, TYPE_HEADERS);
    assert_eq!(headers2.stream_id, 3);

    let mut status_block = Vec::new();
    status_block.extend_from_slice(&hpack_indexed(8));
    peer.write_all(&encode_frame(TYPE_HEADERS, FLAG_END_HEADERS | FLAG_END_STREAM, 3, &status_block))
        .await
        .unwrap();
    let response = handle2.await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn stream_scoped_error_fails_only_that_stream() {
    let (client_io, mut peer) = pair();
    let engine = ProtocolEngine::spawn(client_io, Config::default());
    complete_client_preamble(&mut peer).await;

    let bad = engine
        .submit(Request::get("https", "example.com", "/bad"))
        .await
        .unwrap();
    let good = engine
        .submit(Request::get("https", "example.com", "/good"))
        .await
        .unwrap();

    let bad_headers = read_frame(&mut peer).await;
    assert_eq!(bad_headers.stream_id, 1);
    let good_headers = read_frame(&mut peer).await;
    assert_eq!(good_headers.stream_id, 3);

    // Stream 1's peer sends two :status pseudo-headers, a stream-scoped
    // protocol violation.
    let mut duplicate_status = Vec::new();
    duplicate_status.extend_from_slice(&hpack_indexed(8)); // :status: 200
    duplicate_status.extend_from_slice(&hpack_literal_new_name(b":status", b"304"));
    peer.write_all(&encode_frame(TYPE_HEADERS, FLAG_END_HEADERS | FLAG_END_STREAM, 1, &duplicate_status))
        .await
        .unwrap();

    let rst = read_frame(&mut peer).await;
    assert_eq!(rst.frame_type, TYPE_RST_STREAM);
    assert_eq!(rst.stream_id, 1);
    let error_code = u32::from_be_bytes(rst.payload[..4].try_into().unwrap());
    assert_eq!(error_code, ERROR_CODE_PROTOCOL);

    let bad_err = bad.await.unwrap_err();
    assert_eq!(bad_err.code(), Some(ErrorCode::ProtocolError));

    // Stream 3 is untouched: no GOAWAY was sent, and its response still
    // completes normally.
    let mut status_block = Vec::new();
    status_block.extend_from_slice(&hpack_indexed(8));
    peer.write_all(&encode_frame(TYPE_HEADERS, FLAG_END_HEADERS, 3, &status_block))
        .await
        .unwrap();
    peer.write_all(&encode_frame(TYPE_DATA, FLAG_END_STREAM, 3, b"fine"))
        .await
        .unwrap();

    let response = good.await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"fine");
}
