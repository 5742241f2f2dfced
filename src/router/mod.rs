//! The router: admits subscriptions against the right-verifier, owns the
//! subscription store, and runs one fan-out pump per live identifier.

pub mod store;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::identifier::Identifier;
use crate::model::StatusEvent;
use crate::right_verifier::{RightVerifier, Verdict};
use crate::upstream::UpstreamWorker;
use store::{GetOrCreate, Store, Subscriber};

const EGRESS_CHANNEL_CAPACITY: usize = 5;

pub struct Router {
    store: Arc<Store>,
    right_verifier: RightVerifier,
    dsn_host_port: String,
    auth_field_name: String,
    /// Fires when the process is shutting down. Distinct from any per-worker
    /// `worker_cancel` token — this is the signal downstream client sessions
    /// (which otherwise have no parent in the worker-rooted cancellation
    /// tree, per the two-tree design) watch to close out gracefully.
    shutdown: CancellationToken,
}

impl Router {
    pub fn new(right_verifier: RightVerifier, dsn_host_port: String, auth_field_name: String) -> Self {
        Self {
            store: Arc::new(Store::new()),
            right_verifier,
            dsn_host_port,
            auth_field_name,
            shutdown: CancellationToken::new(),
        }
    }

    /// A token downstream client sessions observe to know when to close.
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether `stop()` has already been called — used by the readiness probe.
    pub fn is_quiesced(&self) -> bool {
        self.store.is_quiesced()
    }

    /// The right-verifier client, exposed for the readiness probe.
    pub fn right_verifier(&self) -> &RightVerifier {
        &self.right_verifier
    }

    /// Admits `ids` on behalf of one aggregator subscription. Authorization
    /// failures are pushed directly onto `out` as NAck/TokenExpired events;
    /// admitted ids either join an existing entry's fan-out or spawn a fresh
    /// upstream worker plus pump.
    pub async fn add_ids(
        &self,
        ids: &[Identifier],
        out: mpsc::Sender<StatusEvent>,
        token: &str,
        aggregator_cancel: CancellationToken,
    ) {
        for &id in ids {
            match self.right_verifier.validate(&id, token).await {
                Verdict::Allowed => {}
                Verdict::TokenExpired => {
                    let _ = out.send(StatusEvent::TokenExpired { id }).await;
                    continue;
                }
                Verdict::NotFound => {
                    let _ = out.send(StatusEvent::not_found(id)).await;
                    continue;
                }
                Verdict::Denied(code) => {
                    let _ = out
                        .send(StatusEvent::generic_nack(id, format!("denied ({code})")))
                        .await;
                    continue;
                }
            }

            let worker_cancel = CancellationToken::new();
            let subscriber = Subscriber {
                out: out.clone(),
                cancel: aggregator_cancel.clone(),
            };

            let mut guard = self.store.lock();
            match Store::get_or_create(&mut guard, id, || worker_cancel.clone(), subscriber) {
                GetOrCreate::Quiescing => {
                    drop(guard);
                    worker_cancel.cancel();
                    return;
                }
                GetOrCreate::Existed => {
                    drop(guard);
                    worker_cancel.cancel();
                }
                GetOrCreate::Created(_) => {
                    drop(guard);
                    crate::metrics::record_identifier_started();
                    let (egress_tx, egress_rx) = mpsc::channel(EGRESS_CHANNEL_CAPACITY);
                    let worker = UpstreamWorker::new(
                        id,
                        self.dsn_host_port.clone(),
                        self.auth_field_name.clone(),
                    );
                    tokio::spawn(worker.run(worker_cancel.clone(), egress_tx));
                    tokio::spawn(fan_out_pump(self.store.clone(), id, worker_cancel, egress_rx));
                }
            }
        }
    }

    /// Cancels every live upstream worker, makes the store permanently
    /// refuse new admissions, and signals every downstream client session to
    /// close.
    pub fn stop(&self) {
        for token in self.store.quiesce_and_drain() {
            token.cancel();
            crate::metrics::record_identifier_stopped();
        }
        self.shutdown.cancel();
    }
}

/// One per live identifier: drains the upstream worker's egress channel,
/// prunes closed subscribers, and fans each event out to the rest. Exits
/// (tearing the entry down) once the subscriber list empties.
async fn fan_out_pump(
    store: Arc<Store>,
    id: Identifier,
    worker_cancel: CancellationToken,
    mut egress: mpsc::Receiver<StatusEvent>,
) {
    loop {
        let event = tokio::select! {
            event = egress.recv() => event,
            _ = worker_cancel.cancelled() => return,
        };

        let Some(event) = event else { return };

        let mut guard = store.lock();
        let Some(entry) = Store::get_mut(&mut guard, &id) else {
            return;
        };

        entry.subscribers.retain(|sub| {
            if sub.cancel.is_cancelled() {
                return false;
            }
            match sub.out.try_send(event.clone()) {
                Ok(()) => {
                    crate::metrics::record_event_forwarded();
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => false,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        if entry.subscribers.is_empty() {
            worker_cancel.cancel();
            Store::delete_locked(&mut guard, &id);
            drop(guard);
            crate::metrics::record_identifier_stopped();
            return;
        }

        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fan_out_pump_removes_entry_once_subscribers_empty() {
        let store = Arc::new(Store::new());
        let id: Identifier = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        let worker_cancel = CancellationToken::new();
        let (egress_tx, egress_rx) = mpsc::channel(5);

        let (sub_tx, sub_rx) = mpsc::channel(5);
        let sub_cancel = CancellationToken::new();
        {
            let mut guard = store.lock();
            Store::get_or_create(
                &mut guard,
                id,
                || worker_cancel.clone(),
                Subscriber {
                    out: sub_tx,
                    cancel: sub_cancel.clone(),
                },
            );
        }

        let pump = tokio::spawn(fan_out_pump(store.clone(), id, worker_cancel.clone(), egress_rx));

        sub_cancel.cancel();
        drop(sub_rx);
        egress_tx
            .send(StatusEvent::Status {
                id,
                online: true,
                extended_status: None,
            })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump should exit promptly")
            .unwrap();

        assert_eq!(store.len(), 0);
        assert!(worker_cancel.is_cancelled());
    }

    #[test]
    fn stop_fires_the_shutdown_signal_for_client_sessions() {
        let router = Router::new(
            crate::right_verifier::RightVerifier::new("http://127.0.0.1:1/".to_string(), false),
            "127.0.0.1:1".to_string(),
            "auth_result".to_string(),
        );
        let signal = router.shutdown_signal();
        assert!(!signal.is_cancelled());

        router.stop();
        assert!(signal.is_cancelled());
    }
}
