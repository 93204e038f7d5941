//! Typed upstream responses and the relay envelope
//!
//! The upstream API answers `{"code": <int>, "message": ..., "data": ...}`.
//! `code == 412` is its anti-scraping challenge and is never surfaced as a
//! successful response: decoding probes `code` first and reports
//! `UpstreamChallenge` before attempting the typed `data`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upstream code signalling the anti-scraping challenge.
pub const CHALLENGE_CODE: i64 = 412;

/// Decoded upstream payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: T,
}

/// The relay's wrapper: `content` holds the raw upstream body as a string.
#[derive(Debug, Deserialize)]
pub struct RelayEnvelope {
    pub content: String,
}

#[derive(Deserialize)]
struct CodeProbe {
    code: i64,
}

/// Result of a single fetch path, before the orchestrator decides between
/// returning it and falling back.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Success(UpstreamResponse<T>),
    /// Decoded fine but upstream answered with the 412 challenge.
    Disqualified,
    TransportError(Error),
    CredentialsExhausted,
}

impl<T> FetchOutcome<T> {
    /// Fold a relay loop result into an outcome.
    pub fn from_result(result: Result<UpstreamResponse<T>>) -> Self {
        match result {
            Ok(response) => FetchOutcome::Success(response),
            Err(Error::UpstreamChallenge) => FetchOutcome::Disqualified,
            Err(Error::CredentialsExhausted { .. }) => FetchOutcome::CredentialsExhausted,
            Err(e) => FetchOutcome::TransportError(e),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Success(_) => "success",
            FetchOutcome::Disqualified => "disqualified",
            FetchOutcome::TransportError(_) => "transport_error",
            FetchOutcome::CredentialsExhausted => "credentials_exhausted",
        }
    }
}

/// Decode an upstream body, classifying the 412 challenge ahead of `data`.
pub fn decode_upstream<T: DeserializeOwned>(body: &[u8]) -> Result<UpstreamResponse<T>> {
    let probe: CodeProbe = serde_json::from_slice(body)
        .map_err(|e| Error::Decode(format!("upstream body has no integer code: {e}")))?;
    if probe.code == CHALLENGE_CODE {
        return Err(Error::UpstreamChallenge);
    }
    serde_json::from_slice(body).map_err(|e| Error::Decode(format!("upstream payload: {e}")))
}

/// Decode the relay envelope.
pub fn decode_envelope(body: &[u8]) -> Result<RelayEnvelope> {
    serde_json::from_slice(body).map_err(|e| Error::Decode(format!("relay envelope: {e}")))
}
