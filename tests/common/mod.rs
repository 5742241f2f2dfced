//! Shared test fixtures: a mock right-verifier (always allows) and mock DSN
//! servers that either stream status frames or close immediately.
//!
//! Grounded on `original_source/pkg/test/main_test.go`'s `startRF` and
//! `RunMockServer` helpers, reimplemented with axum/tokio-tungstenite, and
//! on the teacher pack's `rt-test-utils::mock_ws_server` accept-loop shape
//! (plain `tokio_tungstenite::accept_async` over a `TcpListener`).

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Starts an HTTP server that answers every request with 200 OK, standing
/// in for the external right-verifier.
pub async fn start_mock_right_verifier() -> SocketAddr {
    let app = axum::Router::new().fallback(|| async { StatusCode::OK });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Starts a mock DSN server where every connection receives a
/// `{"status":1}` text frame every `interval`, up to `max_frames` times.
/// Returns the bound address and a counter of accepted connections.
pub async fn start_mock_dsn_serving(
    interval: Duration,
    max_frames: usize,
) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let connections_for_task = connections.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            connections_for_task.fetch_add(1, Ordering::SeqCst);

            tokio::spawn(async move {
                let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let (mut write, _read) = ws_stream.split();

                for _ in 0..max_frames {
                    let payload = serde_json::json!({"status": 1}).to_string();
                    if write.send(WsMessage::Text(payload.into())).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(interval).await;
                }
            });
        }
    });

    (addr, connections)
}

/// Starts a mock DSN server where every connection is immediately closed
/// with `close_code` — standing in for "this identifier isn't served".
pub async fn start_mock_dsn_closing(close_code: u16) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let connections_for_task = connections.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            connections_for_task.fetch_add(1, Ordering::SeqCst);

            tokio::spawn(async move {
                let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let (mut write, _read) = ws_stream.split();
                let frame = CloseFrame {
                    code: close_code.into(),
                    reason: tokio_tungstenite::tungstenite::Utf8Bytes::from_static("not served"),
                };
                let _ = write.send(WsMessage::Close(Some(frame))).await;
            });
        }
    });

    (addr, connections)
}

/// Builds an axum app with the gateway's websocket route and starts it,
/// returning its bound address.
pub async fn start_gateway(router: Arc<status_gateway::router::Router>) -> SocketAddr {
    let app = axum::Router::new()
        .route(
            "/ws/devices/status",
            axum::routing::get(status_gateway::realtime::ws_handler),
        )
        .with_state(router);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}
