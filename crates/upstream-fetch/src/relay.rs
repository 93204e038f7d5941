//! Proxied fetcher: re-issue upstream requests through the scraping relay
//!
//! The target URL is percent-encoded into a query parameter of the relay's base
//! endpoint and the active pool key goes into a request header. The relay
//! answers with an envelope whose `content` is the raw upstream body.
//!
//! Loop handling per relay answer:
//! - 403: the bound key hit its quota. Advance the pool past the index this
//!   attempt was issued against and retry with whatever key is now active.
//!   Exhaustion is fatal. Rotations do not count against the soft budget.
//! - other non-2xx or a transport error: fatal, returned immediately.
//! - undecodable envelope or payload, or upstream code 412: soft retry on the
//!   same (or newly rotated) key after a fixed delay. A 412 never advances the
//!   pool. Soft retries are capped by `max_soft_retries`.

use std::sync::Arc;
use std::time::Duration;

use relay_pool::{Advance, CredentialPool, RelayStatus, classify_status};
use reqwest::header::HeaderName;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::response::{UpstreamResponse, decode_envelope, decode_upstream};

/// Bytes of a fatal relay error body kept in the returned error.
const MAX_ERROR_BODY: usize = 256;

/// Cut `body` to at most `MAX_ERROR_BODY` bytes on a char boundary.
fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

/// Relay endpoint and retry policy.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub base_url: String,
    /// Query parameter that carries the encoded target URL
    pub url_param: String,
    /// Header that carries the active relay key
    pub key_header: String,
    pub max_soft_retries: u32,
    pub soft_retry_delay: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            url_param: "url".into(),
            key_header: "x-api-key".into(),
            max_soft_retries: 8,
            soft_retry_delay: Duration::from_millis(100),
        }
    }
}

/// Fetches through the relay, rotating pool keys on relay rate limits.
#[derive(Clone)]
pub struct RelayFetcher {
    client: reqwest::Client,
    pool: Arc<CredentialPool>,
    base_url: Url,
    url_param: String,
    key_header: HeaderName,
    max_soft_retries: u32,
    soft_retry_delay: Duration,
}

impl RelayFetcher {
    pub fn new(
        client: reqwest::Client,
        pool: Arc<CredentialPool>,
        settings: &RelaySettings,
    ) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| Error::Client(format!("invalid relay base url: {e}")))?;
        let key_header = HeaderName::from_bytes(settings.key_header.as_bytes())
            .map_err(|e| Error::Client(format!("invalid relay key header: {e}")))?;
        Ok(Self {
            client,
            pool,
            base_url,
            url_param: settings.url_param.clone(),
            key_header,
            max_soft_retries: settings.max_soft_retries,
            soft_retry_delay: settings.soft_retry_delay,
        })
    }

    /// The shared credential pool.
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Embed `target` as a percent-encoded query parameter of the relay URL.
    pub fn wrap_url(&self, target: &str) -> Url {
        let mut wrapped = self.base_url.clone();
        wrapped
            .query_pairs_mut()
            .append_pair(&self.url_param, target);
        wrapped
    }

    /// Fetch `url` through the relay until success, exhaustion, a fatal error,
    /// or the soft retry budget runs out.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<UpstreamResponse<T>> {
        let relay_url = self.wrap_url(url);
        let mut credential = self.pool.active().await;
        let mut attempts = 0u32;
        let mut soft_retries = 0u32;

        loop {
            attempts += 1;

            let response = self
                .client
                .get(relay_url.clone())
                .header(&self.key_header, credential.key.expose().as_str())
                .send()
                .await
                .map_err(|e| {
                    error!(credential_index = credential.index, attempts, error = %e, "relay request failed");
                    Error::Transport(format!("relay request failed: {e}"))
                })?;

            let status = response.status();
            match classify_status(status.as_u16()) {
                RelayStatus::QuotaExceeded => {
                    let quota = Error::RelayQuotaExceeded {
                        index: credential.index,
                    };
                    warn!(attempts, error = %quota, "relay rejected credential");
                    match self.pool.advance_if_still_current(credential.index).await {
                        Advance::Exhausted => {
                            error!(
                                keys = self.pool.len(),
                                attempts, "relay credentials exhausted"
                            );
                            return Err(Error::CredentialsExhausted {
                                total: self.pool.len(),
                            });
                        }
                        Advance::Rotated { .. } | Advance::AlreadyRotated { .. } => {
                            credential = self.pool.active().await;
                            continue;
                        }
                    }
                }
                RelayStatus::Fatal => {
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| String::from("<no body>"));
                    let body = truncate_body(body);
                    error!(status = status.as_u16(), attempts, body = %body, "relay returned fatal status");
                    return Err(Error::Transport(format!("relay returned {status}: {body}")));
                }
                RelayStatus::Ok => {}
            }

            let body = response.bytes().await.map_err(|e| {
                error!(attempts, error = %e, "failed to read relay response body");
                Error::Transport(format!("relay body read failed: {e}"))
            })?;

            let absorbed = match decode_envelope(&body)
                .and_then(|envelope| decode_upstream::<T>(envelope.content.as_bytes()))
            {
                Ok(response) => {
                    debug!(
                        credential_index = credential.index,
                        attempts,
                        code = response.code,
                        "relay fetch succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            soft_retries += 1;
            warn!(
                credential_index = credential.index,
                attempts,
                soft_retries,
                error = %absorbed,
                "relay attempt gave no usable payload, retrying"
            );
            if soft_retries > self.max_soft_retries {
                error!(attempts, "relay soft retry budget exhausted");
                return Err(Error::RetriesExhausted { attempts });
            }

            tokio::time::sleep(self.soft_retry_delay).await;
            // Pick up rotations made by concurrent requests meanwhile
            credential = self.pool.active().await;
        }
    }
}
