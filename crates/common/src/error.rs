//! Configuration-layer error types

use thiserror::Error;

/// Errors raised while loading or validating process configuration.
///
/// All of these are startup-time failures: the gateway refuses to bind its
/// listener when any of them occurs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no relay credentials configured: {0}")]
    MissingCredentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
