//! Short-link resolution
//!
//! A single GET with redirects disabled. Success is a 302 carrying a
//! `Location` header; anything else is a failure.

use reqwest::StatusCode;
use reqwest::header::LOCATION;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RedirectResolver {
    client: reqwest::Client,
}

impl RedirectResolver {
    /// `client` must be built with `redirect::Policy::none()`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Resolve `url` to the target of its 302 redirect.
    pub async fn resolve(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "short link request failed");
            Error::Transport(format!("redirect request failed: {e}"))
        })?;

        let status = response.status();
        if status != StatusCode::FOUND {
            warn!(url, status = status.as_u16(), "short link did not redirect");
            return Err(Error::Transport(format!(
                "expected 302 from short link, got {status}"
            )));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Transport("302 without a readable Location header".into()))?;
        debug!(url, location, "short link resolved");
        Ok(location.to_string())
    }
}
