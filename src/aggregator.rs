//! The aggregator: per-client-session fan-in that multiplexes every
//! identifier the session currently subscribes to onto one outbound channel.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::identifier::Identifier;
use crate::model::StatusEvent;
use crate::router::Router;

/// Per-subscriber channel depth. Matches the router's `Subscriber` channel
/// used for fan-out delivery.
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 5;

pub struct Aggregator {
    router: std::sync::Arc<Router>,
    session_cancel: CancellationToken,
    out: mpsc::Sender<StatusEvent>,
    token: String,
    active_subscription: Option<CancellationToken>,
}

impl Aggregator {
    pub fn new(
        router: std::sync::Arc<Router>,
        session_cancel: CancellationToken,
        out: mpsc::Sender<StatusEvent>,
        token: String,
    ) -> Self {
        Self {
            router,
            session_cancel,
            out,
            token,
            active_subscription: None,
        }
    }

    /// Replaces the current subscription set. Tears down the previous
    /// fan-in task (and its subscriber records) before arming the new one —
    /// at most one active subscription per session at any time.
    pub async fn subscribe_devices(&mut self, ids: &[Identifier]) {
        if let Some(prev) = self.active_subscription.take() {
            prev.cancel();
        }

        let sub_cancel = self.session_cancel.child_token();
        self.active_subscription = Some(sub_cancel.clone());

        let (tx, mut rx) = mpsc::channel::<StatusEvent>(SUBSCRIPTION_CHANNEL_CAPACITY);
        let out = self.out.clone();
        let pump_cancel = sub_cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => {
                        match event {
                            Some(event) => {
                                if out.send(event).await.is_err() {
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                    _ = pump_cancel.cancelled() => return,
                }
            }
        });

        self.router
            .add_ids(ids, tx, &self.token, sub_cancel)
            .await;
    }
}
