//! Thin client over the external right-verifier: the only authority on
//! whether a caller's token grants access to a given identifier.

use std::time::Duration;

use crate::identifier::Identifier;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    NotFound,
    TokenExpired,
    Denied(u16),
}

#[derive(Clone)]
pub struct RightVerifier {
    http: reqwest::Client,
    base_url: String,
}

impl RightVerifier {
    pub fn new(base_url: String, skip_tls: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(skip_tls)
            .build()
            .unwrap_or_default();

        Self { http, base_url }
    }

    /// Validate `token` against `id`. Transport failures are treated the
    /// same as an explicit denial.
    pub async fn validate(&self, id: &Identifier, token: &str) -> Verdict {
        let url = format!("{}{}", self.base_url, id);

        let resp = match self.http.get(&url).bearer_auth(token).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "right-verifier unreachable");
                // Transport failures are treated as an explicit 403 (no access),
                // matching the right-verifier's contract.
                return Verdict::NotFound;
            }
        };

        match resp.status().as_u16() {
            200 => Verdict::Allowed,
            401 => Verdict::TokenExpired,
            403 | 404 => Verdict::NotFound,
            other => Verdict::Denied(other),
        }
    }

    /// Lightweight reachability probe used by the readiness endpoint. Any
    /// response at all — even an error status — counts as reachable; only a
    /// transport failure (connect/timeout) means the right-verifier is down.
    pub async fn is_reachable(&self) -> bool {
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, self.http.head(&self.base_url).send()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "right-verifier unreachable during readiness check");
                false
            }
            Err(_) => {
                tracing::warn!("right-verifier readiness check timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_tls_verification_by_default() {
        let rv = RightVerifier::new("https://rf.example/".to_string(), false);
        assert_eq!(rv.base_url, "https://rf.example/");
    }
}
