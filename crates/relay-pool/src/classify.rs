//! Relay response classification
//!
//! The relay signals quota exhaustion of the bound key with HTTP 403. That is
//! the only status the proxied fetcher recovers from by rotating keys; every
//! other non-2xx status is fatal for the request.

/// How a relay HTTP status should be handled by the proxied fetch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    /// 2xx: decode the envelope
    Ok,
    /// 403: the bound key hit its quota, rotate and retry
    QuotaExceeded,
    /// Anything else: propagate without retrying
    Fatal,
}

/// Classify a relay response status.
pub fn classify_status(status: u16) -> RelayStatus {
    match status {
        200..=299 => RelayStatus::Ok,
        403 => RelayStatus::QuotaExceeded,
        _ => RelayStatus::Fatal,
    }
}
