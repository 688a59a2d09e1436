use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::settings::{NonceConfig, MAX_NONCE_WINDOW_SECS};
use crate::error::NonceError;
use crate::security::signature::generate_nonce;

/// Server-side state of an issued nonce
#[derive(Debug, Clone)]
pub struct NonceRecord {
    pub issued_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// A freshly issued nonce as handed to the client
#[derive(Debug, Clone)]
pub struct IssuedNonce {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}

/// Thread-safe store of single-use nonces.
///
/// Unconsumed nonces live for `ttl`; consumed ones are remembered for
/// `retention` so a replay is reported as such rather than as unknown.
/// Either way a nonce can be consumed at most once. Only unconsumed records
/// count against `max_outstanding`.
pub struct NonceStore {
    nonces: DashMap<String, NonceRecord>,
    outstanding: AtomicUsize,
    ttl: Duration,
    retention: Duration,
    max_outstanding: usize,
}

impl NonceStore {
    pub fn new(ttl: Duration, retention: Duration, max_outstanding: usize) -> Self {
        Self {
            nonces: DashMap::new(),
            outstanding: AtomicUsize::new(0),
            ttl,
            retention,
            max_outstanding,
        }
    }

    pub fn from_config(config: &NonceConfig) -> Self {
        // Settings validation rejects larger windows; clamped so Duration never overflows
        let window = |secs: i64| Duration::seconds(secs.clamp(0, MAX_NONCE_WINDOW_SECS));
        Self::new(
            window(config.ttl_secs),
            window(config.retention_secs),
            config.max_outstanding,
        )
    }

    /// Issue a new nonce, valid for the store's TTL.
    pub fn issue(&self) -> Result<IssuedNonce, NonceError> {
        self.issue_at(Utc::now())
    }

    pub fn issue_at(&self, now: DateTime<Utc>) -> Result<IssuedNonce, NonceError> {
        // Soft bound: concurrent issuers may overshoot by a few entries
        if self.outstanding() >= self.max_outstanding {
            self.purge_expired_at(now);
            if self.outstanding() >= self.max_outstanding {
                warn!(
                    outstanding = self.outstanding(),
                    records = self.nonces.len(),
                    max_outstanding = self.max_outstanding,
                    "nonce_store_capacity_exceeded"
                );
                return Err(NonceError::CapacityExceeded(self.max_outstanding));
            }
        }

        let nonce = generate_nonce();
        // Counted before insertion so a concurrent consume never decrements first
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.nonces.insert(
            nonce.clone(),
            NonceRecord {
                issued_at: now,
                consumed_at: None,
            },
        );

        debug!(nonce_prefix = %short(&nonce), "nonce_issued");

        Ok(IssuedNonce {
            nonce,
            expires_at: now + self.ttl,
        })
    }

    /// Mark a nonce as used.
    ///
    /// Returns `true` only for a known, unexpired, never-consumed nonce. The
    /// check and the update happen under the same shard lock, so of several
    /// concurrent callers presenting one nonce exactly one gets `true`.
    pub fn consume(&self, nonce: &str) -> bool {
        self.consume_at(nonce, Utc::now())
    }

    pub fn consume_at(&self, nonce: &str, now: DateTime<Utc>) -> bool {
        let Some(mut record) = self.nonces.get_mut(nonce) else {
            debug!(nonce_prefix = %short(nonce), "nonce_consume_failed_unknown");
            return false;
        };

        if let Some(consumed_at) = record.consumed_at {
            warn!(
                nonce_prefix = %short(nonce),
                consumed_at = %consumed_at,
                "nonce_consume_failed_replay"
            );
            return false;
        }

        if now - record.issued_at >= self.ttl {
            drop(record);
            // An expired unconsumed nonce can never become valid again
            if self
                .nonces
                .remove_if(nonce, |_, record| record.consumed_at.is_none())
                .is_some()
            {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
            }
            debug!(nonce_prefix = %short(nonce), "nonce_consume_failed_expired");
            return false;
        }

        record.consumed_at = Some(now);
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        true
    }

    /// Drop expired unconsumed nonces and consumed nonces past retention.
    /// Returns the number of removed records.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let retention = self.retention;
        let mut removed_count = 0;
        let mut expired_unconsumed = 0;

        self.nonces.retain(|_, record| {
            let keep = match record.consumed_at {
                None => now - record.issued_at < ttl,
                Some(consumed_at) => now - consumed_at < retention,
            };
            if !keep {
                removed_count += 1;
                if record.consumed_at.is_none() {
                    expired_unconsumed += 1;
                }
            }
            keep
        });
        if expired_unconsumed > 0 {
            self.outstanding.fetch_sub(expired_unconsumed, Ordering::SeqCst);
        }

        if removed_count > 0 {
            info!(
                removed_count = removed_count,
                outstanding = self.outstanding(),
                records = self.nonces.len(),
                "nonce_purge_completed"
            );
        }

        removed_count
    }

    /// Register a nonce with a chosen value (for testing purposes).
    #[cfg(test)]
    pub fn seed(&self, nonce: &str, issued_at: DateTime<Utc>) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.nonces.insert(
            nonce.to_string(),
            NonceRecord {
                issued_at,
                consumed_at: None,
            },
        );
    }

    /// Issued nonces that are neither consumed nor purged yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Number of records currently held, consumed ones included.
    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    /// Start background purge task.
    /// Returns a JoinHandle that is aborted on shutdown.
    pub fn start_purge_task(self: &Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            info!(interval_ms = interval.as_millis() as u64, "nonce_purge_task_started");
            loop {
                interval_timer.tick().await;
                store.purge_expired();
            }
        })
    }
}

fn short(nonce: &str) -> &str {
    nonce.get(..8).unwrap_or(nonce)
}
