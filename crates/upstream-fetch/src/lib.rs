//! Resilient upstream fetch layer
//!
//! Delivers raw upstream API payloads as typed responses while working around
//! the upstream's anti-scraping defenses.
//!
//! Request flow:
//! 1. `Fetcher::fetch` probes the upstream directly with a short timeout
//! 2. Success with a code other than 412 is returned as is
//! 3. Otherwise the request is re-issued through the relay, which rotates
//!    through the shared `relay_pool::CredentialPool` on 403s
//! 4. Relay exhaustion or a fatal relay error surfaces as `Error::FetchFailure`
//!
//! `CaptchaVerifier` and `RedirectResolver` share the role clients built by
//! `Clients` but are otherwise independent of the fetch path.

pub mod captcha;
pub mod clients;
pub mod direct;
pub mod error;
pub mod fetcher;
pub mod redirect;
pub mod relay;
pub mod response;

#[cfg(test)]
mod testutil;

pub use captcha::{CaptchaVerifier, DEFAULT_CAPTCHA_ENDPOINT};
pub use clients::{Clients, Timeouts};
pub use direct::DirectFetcher;
pub use error::{Error, Result};
pub use fetcher::Fetcher;
pub use redirect::RedirectResolver;
pub use relay::{RelayFetcher, RelaySettings};
pub use response::{CHALLENGE_CODE, FetchOutcome, RelayEnvelope, UpstreamResponse};
