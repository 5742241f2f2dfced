//! The upstream worker: one per subscribed identifier, holding the single
//! shared connection to the device-status network (DSN) and normalizing its
//! frames onto an egress channel.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::identifier::Identifier;
use crate::model::{upstream_close, DeviceStatusFromDsn, StatusEvent};

const READ_DEADLINE: Duration = Duration::from_secs(30);
const WRITE_DEADLINE: Duration = Duration::from_secs(15);
const RESPAWN_DELAY: Duration = Duration::from_secs(5);

pub struct UpstreamWorker {
    pub id: Identifier,
    pub dsn_host_port: String,
    pub auth_field_name: String,
}

impl UpstreamWorker {
    pub fn new(id: Identifier, dsn_host_port: String, auth_field_name: String) -> Self {
        Self {
            id,
            dsn_host_port,
            auth_field_name,
        }
    }

    /// Runs until `cancel` fires. On any transient failure it sleeps a fixed
    /// `RESPAWN_DELAY` and reconnects — no backoff, no attempt cap, matching
    /// the behavior this gateway was distilled from.
    pub async fn run(self, cancel: CancellationToken, egress: mpsc::Sender<StatusEvent>) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.connect_and_stream(&cancel, &egress).await {
                Ok(()) => return,
                Err(event) => {
                    if let Some(event) = event {
                        let _ = egress.try_send(event);
                    }
                }
            }

            crate::metrics::record_upstream_respawn();
            tokio::select! {
                _ = sleep(RESPAWN_DELAY) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Returns `Ok(())` when cancelled cleanly, `Err(Some(event))` when a
    /// normalized failure event should be emitted before respawning, and
    /// `Err(None)` for a silent respawn — mid-stream read errors, read
    /// timeouts, and pong write timeouts never surface to subscribers, only
    /// the initial dial failure and an explicit upstream close frame do.
    async fn connect_and_stream(
        &self,
        cancel: &CancellationToken,
        egress: &mpsc::Sender<StatusEvent>,
    ) -> Result<(), Option<StatusEvent>> {
        let url = format!(
            "ws://{}/ws/status/{}?{}=200",
            self.dsn_host_port, self.id, self.auth_field_name
        );

        let (ws_stream, _response) = tokio::select! {
            result = tokio_tungstenite::connect_async(&url) => result.map_err(|e| {
                Some(StatusEvent::generic_nack(self.id, format!("dial failed: {e}")))
            })?,
            _ = cancel.cancelled() => return Ok(()),
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            let next = tokio::select! {
                msg = timeout(READ_DEADLINE, read.next()) => msg,
                _ = cancel.cancelled() => {
                    let _ = timeout(WRITE_DEADLINE, write.send(WsMessage::Close(None))).await;
                    return Ok(());
                }
            };

            let msg = match next {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::warn!(id = %self.id, error = %e, "upstream read error, respawning");
                    return Err(None);
                }
                Ok(None) => return Err(None),
                Err(_elapsed) => {
                    tracing::warn!(id = %self.id, "upstream read timeout, respawning");
                    return Err(None);
                }
            };

            match msg {
                WsMessage::Text(text) => {
                    match serde_json::from_str::<DeviceStatusFromDsn>(&text) {
                        Ok(status) => {
                            let event = StatusEvent::Status {
                                id: self.id,
                                online: status.status > 0,
                                extended_status: status.extended_status,
                            };
                            if egress.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            tracing::warn!(id = %self.id, error = %e, "malformed DSN frame");
                        }
                    }
                }
                WsMessage::Ping(payload) => {
                    if timeout(WRITE_DEADLINE, write.send(WsMessage::Pong(payload)))
                        .await
                        .is_err()
                    {
                        tracing::warn!(id = %self.id, "pong write timeout, respawning");
                        return Err(None);
                    }
                }
                WsMessage::Pong(_) => {}
                WsMessage::Close(frame) => {
                    return Err(Some(close_frame_to_event(self.id, frame)));
                }
                WsMessage::Binary(_) | WsMessage::Frame(_) => {}
            }
        }
    }
}

fn close_frame_to_event(
    id: Identifier,
    frame: Option<tokio_tungstenite::tungstenite::protocol::CloseFrame<'static>>,
) -> StatusEvent {
    let Some(frame) = frame else {
        return StatusEvent::generic_nack(id, "upstream closed without a reason");
    };

    let code: u16 = frame.code.into();
    match code {
        upstream_close::TOKEN_EXPIRED => StatusEvent::TokenExpired { id },
        upstream_close::NOT_FOUND => StatusEvent::not_found(id),
        _ => StatusEvent::generic_nack(id, frame.reason.to_string()),
    }
}
