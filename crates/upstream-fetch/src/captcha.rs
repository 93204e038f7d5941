//! Captcha token verification
//!
//! Posts the client's token and the site secret to the validation endpoint.
//! Fails closed: any transport or decode problem is logged and reported as an
//! unverified token.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Cloudflare Turnstile siteverify endpoint.
pub const DEFAULT_CAPTCHA_ENDPOINT: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
}

#[derive(Debug, Clone)]
pub struct CaptchaVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl CaptchaVerifier {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Returns whether the validation service accepted `token`. Never errors.
    pub async fn verify(&self, token: &str, secret: &str) -> bool {
        let verified = match self.request(token, secret).await {
            Ok(success) => {
                debug!(success, "captcha verification answered");
                success
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "captcha verification failed, rejecting token");
                false
            }
        };
        let result = if verified { "pass" } else { "fail" };
        metrics::counter!("captcha_verifications_total", "result" => result).increment(1);
        verified
    }

    async fn request(&self, token: &str, secret: &str) -> Result<bool> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("response", token), ("secret", secret)])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("captcha request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "captcha endpoint returned {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("captcha body read failed: {e}")))?;
        let parsed: VerifyResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Decode(format!("captcha response: {e}")))?;
        Ok(parsed.success)
    }
}
