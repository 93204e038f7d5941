//! Shared types for the fetch gateway workspace
//!
//! Holds the redacting `Secret` wrapper used for relay keys and the captcha
//! secret, plus the configuration-layer error type.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
