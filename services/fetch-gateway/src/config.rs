//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Relay keys come from the semicolon-delimited RELAY_KEYS env var or
//! `relay.keys_file`, and the captcha secret from CAPTCHA_SECRET. Neither is
//! ever stored in the TOML directly.

use common::Secret;
use relay_pool::parse_keys;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use upstream_fetch::{DEFAULT_CAPTCHA_ENDPOINT, RelaySettings, Timeouts};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub direct: DirectConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub redirect: RedirectConfig,
}

/// Inbound listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Direct probe settings
#[derive(Debug, Deserialize)]
pub struct DirectConfig {
    #[serde(default = "default_direct_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_direct_timeout_ms(),
        }
    }
}

/// Relay endpoint, retry policy and credentials
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub base_url: String,
    #[serde(default = "default_url_param")]
    pub url_param: String,
    #[serde(default = "default_key_header")]
    pub key_header: String,
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_soft_retries")]
    pub max_soft_retries: u32,
    #[serde(default = "default_soft_retry_delay_ms")]
    pub soft_retry_delay_ms: u64,
    /// Path to a file holding the key list (alternative to RELAY_KEYS)
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
    #[serde(skip)]
    pub keys: Vec<Secret<String>>,
}

/// Captcha validation settings
#[derive(Debug, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default = "default_captcha_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_captcha_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub secret: Option<Secret<String>>,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            endpoint: default_captcha_endpoint(),
            timeout_secs: default_captcha_timeout(),
            secret: None,
        }
    }
}

/// Short-link resolution settings
#[derive(Debug, Deserialize)]
pub struct RedirectConfig {
    #[serde(default = "default_redirect_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_redirect_timeout_ms(),
        }
    }
}

fn default_max_connections() -> usize {
    64
}

fn default_direct_timeout_ms() -> u64 {
    3000
}

fn default_url_param() -> String {
    "url".into()
}

fn default_key_header() -> String {
    "x-api-key".into()
}

fn default_relay_timeout() -> u64 {
    30
}

fn default_max_soft_retries() -> u32 {
    8
}

fn default_soft_retry_delay_ms() -> u64 {
    100
}

fn default_captcha_endpoint() -> String {
    DEFAULT_CAPTCHA_ENDPOINT.into()
}

fn default_captcha_timeout() -> u64 {
    10
}

fn default_redirect_timeout_ms() -> u64 {
    3000
}

fn require_http(field: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

fn require_nonzero(field: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        return Err(common::Error::Config(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Relay key resolution order:
    /// 1. RELAY_KEYS env var
    /// 2. relay.keys_file path from config
    ///
    /// Ending up with zero keys is a startup error.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http("relay.base_url", &config.relay.base_url)?;
        require_http("captcha.endpoint", &config.captcha.endpoint)?;
        require_nonzero("direct.timeout_ms", config.direct.timeout_ms)?;
        require_nonzero("relay.timeout_secs", config.relay.timeout_secs)?;
        require_nonzero("captcha.timeout_secs", config.captcha.timeout_secs)?;
        require_nonzero("redirect.timeout_ms", config.redirect.timeout_ms)?;
        require_nonzero(
            "server.max_connections",
            config.server.max_connections as u64,
        )?;

        config.relay.keys = match std::env::var("RELAY_KEYS") {
            Ok(raw) => parse_keys(&raw),
            Err(_) => match config.relay.keys_file {
                Some(ref keys_file) => {
                    let raw = std::fs::read_to_string(keys_file).map_err(|e| {
                        common::Error::Config(format!(
                            "failed to read relay.keys_file {}: {e}",
                            keys_file.display()
                        ))
                    })?;
                    parse_keys(&raw)
                }
                None => Vec::new(),
            },
        };
        if config.relay.keys.is_empty() {
            return Err(common::Error::MissingCredentials(
                "set RELAY_KEYS or relay.keys_file to a semicolon-delimited key list".into(),
            ));
        }

        if let Ok(secret) = std::env::var("CAPTCHA_SECRET") {
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.captcha.secret = Some(Secret::new(secret));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("fetch-gateway.toml")
    }

    /// Per-role client timeouts.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            direct: Duration::from_millis(self.direct.timeout_ms),
            relay: Duration::from_secs(self.relay.timeout_secs),
            captcha: Duration::from_secs(self.captcha.timeout_secs),
            redirect: Duration::from_millis(self.redirect.timeout_ms),
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            base_url: self.relay.base_url.clone(),
            url_param: self.relay.url_param.clone(),
            key_header: self.relay.key_header.clone(),
            max_soft_retries: self.relay.max_soft_retries,
            soft_retry_delay: Duration::from_millis(self.relay.soft_retry_delay_ms),
        }
    }
}
