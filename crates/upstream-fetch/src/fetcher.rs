//! Fetch orchestrator
//!
//! Runs the direct probe first and only pays for the relay (and its
//! credentials) when the probe is disqualified or fails. The orchestrator is
//! the first layer that surfaces a hard failure to its caller.

use std::sync::Arc;

use relay_pool::CredentialPool;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::clients::Clients;
use crate::direct::DirectFetcher;
use crate::error::{Error, Result};
use crate::relay::{RelayFetcher, RelaySettings};
use crate::response::{FetchOutcome, UpstreamResponse};

/// Direct-then-relay fetcher shared by all request handlers.
#[derive(Clone)]
pub struct Fetcher {
    direct: DirectFetcher,
    relay: RelayFetcher,
}

impl Fetcher {
    pub fn new(direct: DirectFetcher, relay: RelayFetcher) -> Self {
        Self { direct, relay }
    }

    /// Wire both paths from the role clients and the shared pool.
    pub fn from_clients(
        clients: &Clients,
        pool: Arc<CredentialPool>,
        relay: &RelaySettings,
    ) -> Result<Self> {
        Ok(Self::new(
            DirectFetcher::new(clients.direct.clone()),
            RelayFetcher::new(clients.relay.clone(), pool, relay)?,
        ))
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        self.relay.pool()
    }

    /// Fetch `url` as a typed upstream response.
    ///
    /// Fails with `FetchFailure` wrapping the relay's fatal error once both
    /// paths are exhausted.
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<UpstreamResponse<T>> {
        let outcome = self.direct.fetch::<T>(url).await;
        metrics::counter!("fetch_path_total", "path" => "direct", "outcome" => outcome.label())
            .increment(1);

        match outcome {
            FetchOutcome::Success(response) => {
                debug!(url, "served from direct path");
                return Ok(response);
            }
            FetchOutcome::TransportError(e) => {
                info!(url, reason = e.kind(), error = %e, "direct path failed, falling back to relay");
            }
            other => {
                info!(url, reason = other.label(), "direct path disqualified, falling back to relay");
            }
        }

        let outcome = FetchOutcome::from_result(self.relay.fetch::<T>(url).await);
        metrics::counter!("fetch_path_total", "path" => "relay", "outcome" => outcome.label())
            .increment(1);

        let source = match outcome {
            FetchOutcome::Success(response) => return Ok(response),
            FetchOutcome::TransportError(e) => e,
            FetchOutcome::CredentialsExhausted => Error::CredentialsExhausted {
                total: self.pool().len(),
            },
            FetchOutcome::Disqualified => Error::UpstreamChallenge,
        };
        error!(url, error = %source, "fetch failed on both paths");
        Err(Error::FetchFailure {
            url: url.to_string(),
            source: Box::new(source),
        })
    }
}
