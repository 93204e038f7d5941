//! Long-lived outbound HTTP clients, one per fetch role
//!
//! Each role keeps its own connection pool and fixed timeout so that a slow
//! relay cannot starve direct probes or captcha checks.

use std::time::Duration;

use crate::error::{Error, Result};

/// Fixed per-role timeouts.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Bounds user-facing latency of the direct probe.
    pub direct: Duration,
    pub relay: Duration,
    pub captcha: Duration,
    pub redirect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            direct: Duration::from_secs(3),
            relay: Duration::from_secs(30),
            captcha: Duration::from_secs(10),
            redirect: Duration::from_secs(3),
        }
    }
}

/// The four role clients.
#[derive(Debug, Clone)]
pub struct Clients {
    pub direct: reqwest::Client,
    pub relay: reqwest::Client,
    pub captcha: reqwest::Client,
    pub redirect: reqwest::Client,
}

impl Clients {
    pub fn new(timeouts: &Timeouts) -> Result<Self> {
        // Direct path never goes through an environment proxy
        let direct = reqwest::Client::builder()
            .timeout(timeouts.direct)
            .no_proxy()
            .build()
            .map_err(|e| Error::Client(format!("direct client: {e}")))?;

        let relay = reqwest::Client::builder()
            .timeout(timeouts.relay)
            .build()
            .map_err(|e| Error::Client(format!("relay client: {e}")))?;

        let captcha = reqwest::Client::builder()
            .timeout(timeouts.captcha)
            .build()
            .map_err(|e| Error::Client(format!("captcha client: {e}")))?;

        let redirect = reqwest::Client::builder()
            .timeout(timeouts.redirect)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Client(format!("redirect client: {e}")))?;

        Ok(Self {
            direct,
            relay,
            captcha,
            redirect,
        })
    }
}
