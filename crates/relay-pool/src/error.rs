//! Error types for pool construction

/// Errors from pool construction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential pool requires at least one relay key")]
    EmptyPool,
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
