//! Credential cursor and compare-and-advance rotation
//!
//! The pool owns an immutable list of relay keys and a cursor protected by a
//! single mutex. Reading the active key and advancing the cursor both happen
//! under that lock, so a rotation is one atomic step.
//!
//! The cursor only moves forward. A caller that hit a 403 passes the index it
//! observed when it started; if the cursor has already moved past that index,
//! another caller handled the same rate-limit event and this caller simply
//! retries with the key that is now active.

use common::Secret;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Snapshot of the key bound to outbound relay requests.
///
/// `index` is the version of the credential: pass it back to
/// [`CredentialPool::advance_if_still_current`] when this key gets rate-limited.
#[derive(Debug, Clone)]
pub struct ActiveCredential {
    pub index: usize,
    pub key: Secret<String>,
}

/// Result of a compare-and-advance on the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// This caller moved the cursor to `index`.
    Rotated { index: usize },
    /// Another caller already moved the cursor past the observed index.
    AlreadyRotated { index: usize },
    /// No key remains after the observed one. Fatal for the request.
    Exhausted,
}

#[derive(Debug)]
struct Cursor {
    active: usize,
    exhausted: bool,
}

/// Ordered pool of relay keys with a forward-only cursor.
pub struct CredentialPool {
    keys: Vec<Secret<String>>,
    cursor: Mutex<Cursor>,
}

/// Split a semicolon-delimited key list, trimming whitespace and dropping
/// empty entries.
pub fn parse_keys(raw: &str) -> Vec<Secret<String>> {
    raw.split(';')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| Secret::new(k.to_owned()))
        .collect()
}

impl CredentialPool {
    /// Build a pool from an ordered key list. The first key starts active.
    pub fn new(keys: Vec<Secret<String>>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::EmptyPool);
        }
        info!(keys = keys.len(), "credential pool initialized");
        Ok(Self {
            keys,
            cursor: Mutex::new(Cursor {
                active: 0,
                exhausted: false,
            }),
        })
    }

    /// Build a pool from the semicolon-delimited form used by `RELAY_KEYS`.
    pub fn from_delimited(raw: &str) -> Result<Self> {
        Self::new(parse_keys(raw))
    }

    /// Number of keys loaded at startup.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false: construction rejects an empty key list.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of the key currently bound to relay requests.
    pub async fn current_index(&self) -> usize {
        self.cursor.lock().await.active
    }

    /// Index and key of the currently bound credential, read under the lock.
    pub async fn active(&self) -> ActiveCredential {
        let cursor = self.cursor.lock().await;
        ActiveCredential {
            index: cursor.active,
            key: self.keys[cursor.active].clone(),
        }
    }

    /// Whether the last key has been rate-limited.
    pub async fn is_exhausted(&self) -> bool {
        self.cursor.lock().await.exhausted
    }

    /// Advance past `observed` if it is still the active index.
    ///
    /// - `observed == active`: move to the next key, or report `Exhausted`
    ///   when `observed` is the last slot. The cursor never leaves the key list.
    /// - `observed < active`: someone else already rotated for this event;
    ///   report the current index without moving.
    ///
    /// `observed` must come from an earlier [`active`](Self::active) or
    /// [`current_index`](Self::current_index) read, so it is never ahead of
    /// the cursor.
    pub async fn advance_if_still_current(&self, observed: usize) -> Advance {
        let mut cursor = self.cursor.lock().await;
        debug_assert!(
            observed <= cursor.active,
            "observed index {observed} is ahead of the cursor {}",
            cursor.active
        );

        if observed < cursor.active {
            return Advance::AlreadyRotated {
                index: cursor.active,
            };
        }

        let next = cursor.active + 1;
        if next >= self.keys.len() {
            if !cursor.exhausted {
                warn!(
                    credential_index = cursor.active,
                    keys = self.keys.len(),
                    "last relay credential rate-limited, pool exhausted"
                );
                metrics::counter!("relay_credentials_exhausted_total").increment(1);
            }
            cursor.exhausted = true;
            return Advance::Exhausted;
        }

        cursor.active = next;
        info!(
            from = observed,
            to = next,
            remaining = self.keys.len() - next,
            "relay credential rate-limited, rotated to next key"
        );
        metrics::counter!("relay_credential_rotations_total").increment(1);
        Advance::Rotated { index: next }
    }

    /// Pool summary for the health endpoint.
    ///
    /// Status mapping: first key still active → healthy, rotated at least once →
    /// degraded, exhausted → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let cursor = self.cursor.lock().await;
        let total = self.keys.len();
        let remaining = if cursor.exhausted {
            0
        } else {
            total - cursor.active
        };
        let status = if cursor.exhausted {
            "unhealthy"
        } else if cursor.active == 0 {
            "healthy"
        } else {
            "degraded"
        };

        serde_json::json!({
            "status": status,
            "active_index": cursor.active,
            "credentials_total": total,
            "credentials_remaining": remaining,
            "exhausted": cursor.exhausted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pool_of(n: usize) -> CredentialPool {
        let keys = (0..n).map(|i| Secret::new(format!("key-{i}"))).collect();
        CredentialPool::new(keys).unwrap()
    }

    #[test]
    fn empty_key_list_is_rejected() {
        assert!(matches!(CredentialPool::new(vec![]), Err(Error::EmptyPool)));
        assert!(matches!(
            CredentialPool::from_delimited(" ; ;"),
            Err(Error::EmptyPool)
        ));
    }

    #[test]
    fn parse_keys_trims_and_drops_empty_entries() {
        let keys = parse_keys(" a ;b;;  ;c;");
        let exposed: Vec<&str> = keys.iter().map(|k| k.expose().as_str()).collect();
        assert_eq!(exposed, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn starts_at_first_key() {
        let pool = pool_of(3);
        let active = pool.active().await;
        assert_eq!(active.index, 0);
        assert_eq!(active.key.expose(), "key-0");
        assert_eq!(pool.current_index().await, 0);
    }

    #[tokio::test]
    async fn advance_moves_to_next_key_and_binds_it() {
        let pool = pool_of(3);

        assert_eq!(
            pool.advance_if_still_current(0).await,
            Advance::Rotated { index: 1 }
        );
        let active = pool.active().await;
        assert_eq!(active.index, 1);
        assert_eq!(active.key.expose(), "key-1");
    }

    #[tokio::test]
    async fn stale_observer_does_not_double_skip() {
        let pool = pool_of(3);

        assert_eq!(
            pool.advance_if_still_current(0).await,
            Advance::Rotated { index: 1 }
        );
        // Second caller also saw index 0 before the rotation landed
        assert_eq!(
            pool.advance_if_still_current(0).await,
            Advance::AlreadyRotated { index: 1 }
        );
        assert_eq!(pool.current_index().await, 1);
    }

    #[tokio::test]
    async fn last_key_reports_exhausted_and_stays_in_range() {
        let pool = pool_of(2);

        assert_eq!(
            pool.advance_if_still_current(0).await,
            Advance::Rotated { index: 1 }
        );
        assert_eq!(pool.advance_if_still_current(1).await, Advance::Exhausted);
        assert_eq!(pool.current_index().await, 1);
        assert!(pool.is_exhausted().await);

        // Sticky: later requests against the last key see exhaustion too
        assert_eq!(pool.advance_if_still_current(1).await, Advance::Exhausted);
        // Stale observers still get pointed at the last key
        assert_eq!(
            pool.advance_if_still_current(0).await,
            Advance::AlreadyRotated { index: 1 }
        );
    }

    #[tokio::test]
    async fn single_key_pool_exhausts_on_first_rate_limit() {
        let pool = pool_of(1);
        assert_eq!(pool.advance_if_still_current(0).await, Advance::Exhausted);
        assert_eq!(pool.current_index().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rate_limits_on_same_index_advance_once() {
        let pool = Arc::new(pool_of(5));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.advance_if_still_current(0).await
            }));
        }

        let mut rotated = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Advance::Rotated { index } => {
                    assert_eq!(index, 1);
                    rotated += 1;
                }
                Advance::AlreadyRotated { index } => {
                    assert_eq!(index, 1);
                    already += 1;
                }
                Advance::Exhausted => panic!("pool of 5 must not exhaust"),
            }
        }

        assert_eq!(rotated, 1, "exactly one caller performs the rotation");
        assert_eq!(already, 31);
        assert_eq!(pool.current_index().await, 1);
    }

    #[tokio::test]
    async fn index_is_monotonic_across_mixed_observers() {
        let pool = pool_of(4);
        let mut last = pool.current_index().await;
        for observed in [0, 0, 1, 0, 2, 1, 3, 3] {
            pool.advance_if_still_current(observed).await;
            let now = pool.current_index().await;
            assert!(now >= last, "index went backwards: {last} -> {now}");
            last = now;
        }
        assert_eq!(last, 3);
    }

    #[tokio::test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "ahead of the cursor")]
    async fn observed_index_ahead_of_cursor_is_rejected_in_debug() {
        let pool = pool_of(3);
        pool.advance_if_still_current(2).await;
    }

    #[tokio::test]
    async fn health_tracks_rotation_state() {
        let pool = pool_of(2);

        let health = pool.health().await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["credentials_total"], 2);
        assert_eq!(health["credentials_remaining"], 2);

        pool.advance_if_still_current(0).await;
        let health = pool.health().await;
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["active_index"], 1);
        assert_eq!(health["credentials_remaining"], 1);

        pool.advance_if_still_current(1).await;
        let health = pool.health().await;
        assert_eq!(health["status"], "unhealthy");
        assert_eq!(health["credentials_remaining"], 0);
        assert_eq!(health["exhausted"], true);
    }

    #[test]
    fn active_credential_debug_redacts_key() {
        let active = ActiveCredential {
            index: 0,
            key: Secret::new("super-secret".into()),
        };
        let debug = format!("{active:?}");
        assert!(!debug.contains("super-secret"), "got: {debug}");
    }

    #[tokio::test]
    async fn rotations_and_exhaustion_are_counted() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let pool = pool_of(2);
        pool.advance_if_still_current(0).await;
        pool.advance_if_still_current(1).await;
        pool.advance_if_still_current(1).await;

        let output = handle.render();
        assert!(
            output.contains("relay_credential_rotations_total 1"),
            "got: {output}"
        );
        assert!(
            output.contains("relay_credentials_exhausted_total 1"),
            "exhaustion must be counted once, got: {output}"
        );
    }
}
