//! The downstream WebSocket handler: one client session per connection,
//! bridging inbound subscription requests to the aggregator and outbound
//! status events back to the socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::model::{downstream_close, CloseMessage, RequestMessage, StatusEvent};
use crate::router::Router;

const READ_DEADLINE: Duration = Duration::from_secs(30);
const WRITE_DEADLINE: Duration = Duration::from_secs(15);
const PING_PERIOD: Duration = Duration::from_millis((30_000_f64 * 0.9) as u64);
const OUT_CHANNEL_CAPACITY: usize = 20;

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    pub token: Option<String>,
    #[allow(dead_code)]
    pub request_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(router): State<Arc<Router>>,
    Query(query): Query<SubscribeQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, router, query.token))
}

enum CloseReason {
    Graceful(u16, String),
    Force,
}

async fn handle_socket(socket: WebSocket, router: Arc<Router>, token: Option<String>) {
    let (sender, receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    let Some(token) = token else {
        write_close(&sender, downstream_close::FORBIDDEN, "no token").await;
        return;
    };

    crate::metrics::record_client_session_started();
    let shutdown = router.shutdown_signal();
    let session_cancel = CancellationToken::new();
    let (out_tx, mut out_rx) = mpsc::channel::<StatusEvent>(OUT_CHANNEL_CAPACITY);
    let mut aggregator = Aggregator::new(router, session_cancel.clone(), out_tx, token);

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<RequestMessage>(5);
    let (close_tx, mut close_rx) = mpsc::channel::<CloseReason>(1);

    let reader_cancel = session_cancel.clone();
    let reader_close_tx = close_tx.clone();
    let reader = tokio::spawn(read_loop(receiver, inbound_tx, reader_close_tx, reader_cancel));

    let mut ping_interval = interval(PING_PERIOD);
    ping_interval.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            event = out_rx.recv() => {
                let Some(event) = event else { break };
                if matches!(event, StatusEvent::TokenExpired { .. }) {
                    write_close(&sender, downstream_close::TOKEN_EXPIRED, "token expired").await;
                    break;
                }
                if write_json(&sender, &event).await.is_err() {
                    write_close(&sender, downstream_close::INTERNAL, "send failed").await;
                    break;
                }
            }
            req = inbound_rx.recv() => {
                let Some(req) = req else { break };
                aggregator.subscribe_devices(&req.ids).await;
            }
            reason = close_rx.recv() => {
                match reason {
                    Some(CloseReason::Graceful(code, reason)) => {
                        write_close(&sender, code, &reason).await;
                        break;
                    }
                    Some(CloseReason::Force) | None => break,
                }
            }
            _ = ping_interval.tick() => {
                let mut guard = sender.lock().await;
                if timeout(WRITE_DEADLINE, guard.send(Message::Ping(Vec::new().into())))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            _ = shutdown.cancelled() => {
                write_close(&sender, downstream_close::OK, "server shutting down").await;
                break;
            }
        }
    }

    session_cancel.cancel();
    reader.abort();
    crate::metrics::record_client_session_stopped();
}

async fn read_loop(
    mut receiver: futures::stream::SplitStream<WebSocket>,
    inbound_tx: mpsc::Sender<RequestMessage>,
    close_tx: mpsc::Sender<CloseReason>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            msg = timeout(READ_DEADLINE, receiver.next()) => msg,
            _ = cancel.cancelled() => return,
        };

        let msg = match next {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(_))) | Err(_) => {
                let _ = close_tx.send(CloseReason::Force).await;
                return;
            }
            Ok(None) => {
                let _ = close_tx.send(CloseReason::Force).await;
                return;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<RequestMessage>(&text) {
                Ok(req) => {
                    if inbound_tx.send(req).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed request frame");
                }
            },
            Message::Close(_) => {
                let _ = close_tx
                    .send(CloseReason::Graceful(downstream_close::OK, "client closed".into()))
                    .await;
                return;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

type Sender = Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>;

async fn write_json(sender: &Sender, event: &StatusEvent) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|_| ())?;
    let mut guard = sender.lock().await;
    timeout(WRITE_DEADLINE, guard.send(Message::Text(text.into())))
        .await
        .map_err(|_| ())?
        .map_err(|_| ())
}

async fn write_close(sender: &Sender, code: u16, reason: &str) {
    let close_msg = CloseMessage::new(code, reason);
    if let Ok(text) = serde_json::to_string(&close_msg) {
        let mut guard = sender.lock().await;
        let _ = timeout(WRITE_DEADLINE, guard.send(Message::Text(text.into()))).await;
        let _ = timeout(
            WRITE_DEADLINE,
            guard.send(Message::Close(Some(axum::extract::ws::CloseFrame {
                code,
                reason: reason.to_string().into(),
            }))),
        )
        .await;
    }
}
