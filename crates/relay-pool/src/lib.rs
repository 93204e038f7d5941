//! Relay credential pool
//!
//! Holds the ordered list of relay access keys loaded at startup and a cursor
//! naming the key currently bound to outbound relay requests. Keys are consumed
//! in order: once the relay rate-limits the active key the cursor moves to the
//! next slot and never comes back.
//!
//! Key lifecycle:
//! 1. Keys are parsed from the semicolon-delimited `RELAY_KEYS` list at startup
//! 2. Every proxied request snapshots the active key and its index
//! 3. Relay answers 403 → the request asks the pool to advance past the index
//!    it observed; concurrent callers that observed the same index share a
//!    single advance
//! 4. Advancing past the last key marks the pool exhausted

pub mod classify;
pub mod error;
pub mod pool;

pub use classify::{RelayStatus, classify_status};
pub use error::{Error, Result};
pub use pool::{ActiveCredential, Advance, CredentialPool, parse_keys};
