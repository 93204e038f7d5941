//! Direct fetcher: one unauthenticated probe straight at the upstream API
//!
//! Exactly one attempt per call. Every failure is absorbed into a
//! `FetchOutcome` so the orchestrator can fall back to the relay.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::Error;
use crate::response::{FetchOutcome, decode_upstream};

/// Fast-fail upstream probe. The client carries the short direct timeout.
#[derive(Debug, Clone)]
pub struct DirectFetcher {
    client: reqwest::Client,
}

impl DirectFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` once and classify the result.
    ///
    /// - transport failure, non-2xx or malformed body → `TransportError`
    /// - upstream code 412 → `Disqualified`
    /// - anything else → `Success`
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str) -> FetchOutcome<T> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                let kind = if e.is_timeout() { "timeout" } else { "request" };
                warn!(url, error = %e, kind, "direct request failed");
                return FetchOutcome::TransportError(Error::Transport(format!(
                    "direct {kind} failed: {e}"
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "direct request returned non-success status");
            return FetchOutcome::TransportError(Error::Transport(format!(
                "direct request returned {status}"
            )));
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(url, error = %e, "failed to read direct response body");
                return FetchOutcome::TransportError(Error::Transport(format!(
                    "direct body read failed: {e}"
                )));
            }
        };

        match decode_upstream::<T>(&body) {
            Ok(response) => {
                debug!(url, code = response.code, "direct fetch succeeded");
                FetchOutcome::Success(response)
            }
            Err(Error::UpstreamChallenge) => {
                warn!(url, "direct request hit upstream challenge (code 412)");
                FetchOutcome::Disqualified
            }
            Err(e) => {
                warn!(url, error = %e, "direct response could not be decoded");
                FetchOutcome::TransportError(e)
            }
        }
    }
}
