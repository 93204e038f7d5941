//! Fetch error taxonomy
//!
//! Soft conditions (`UpstreamChallenge`, `RelayQuotaExceeded`, `Decode`) are
//! absorbed inside the fetchers and only show up here so they can be logged
//! and matched. `FetchFailure` is what the orchestrator hands back once both
//! the direct and relayed paths have failed.

/// Errors from fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("upstream anti-scraping challenge (code 412)")]
    UpstreamChallenge,

    #[error("relay rate-limited credential {index}")]
    RelayQuotaExceeded { index: usize },

    #[error("all {total} relay credentials exhausted")]
    CredentialsExhausted { total: usize },

    #[error("relay gave no usable payload after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("fetch failed for {url}: {source}")]
    FetchFailure {
        url: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True when this error, or the failure it wraps, is credential exhaustion.
    pub fn is_credentials_exhausted(&self) -> bool {
        match self {
            Error::CredentialsExhausted { .. } => true,
            Error::FetchFailure { source, .. } => source.is_credentials_exhausted(),
            _ => false,
        }
    }

    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport(_) => "transport",
            Error::Decode(_) => "decode",
            Error::UpstreamChallenge => "challenge",
            Error::RelayQuotaExceeded { .. } => "relay_quota",
            Error::CredentialsExhausted { .. } => "credentials_exhausted",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::Client(_) => "client",
            Error::FetchFailure { source, .. } => source.kind(),
        }
    }
}

/// Result alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;
