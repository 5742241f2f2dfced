use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::router::Router;

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    right_verifier_reachable: bool,
}

/// Liveness probe — the process is running and the executor is responsive.
pub async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Readiness probe — the store has not been quiesced and the right-verifier
/// is reachable. There is no database to check; "ready" here means "still
/// able to admit new subscriptions".
pub async fn readiness(State(router): State<Arc<Router>>) -> (StatusCode, Json<ReadinessResponse>) {
    let right_verifier_reachable = router.right_verifier().is_reachable().await;
    let ready = !router.is_quiesced() && right_verifier_reachable;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(ReadinessResponse {
            ready,
            right_verifier_reachable,
        }),
    )
}
