//! Dual-tier idempotency ledger: a process-local TTL cache in front of
//! the durable `processed_events` table.
//!
//! Reads fail open. Losing an event is worse than double-processing one,
//! so a durable-store outage answers "not processed" and every downstream
//! unit stays safe to run twice.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{error, info};

use relay_db::repositories::ProcessedEventRepository;

const CACHE_TTL: Duration = Duration::from_secs(60);
const CACHE_CAPACITY: usize = 10_000;
/// Share of the cache dropped in one eviction sweep, bounding eviction
/// cost under sustained pressure.
const EVICTION_SHARE: f64 = 0.3;

pub struct IdempotencyStore {
    repo: Arc<dyn ProcessedEventRepository>,
    cache: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    capacity: usize,
}

impl IdempotencyStore {
    pub fn new(repo: Arc<dyn ProcessedEventRepository>) -> Self {
        Self::with_cache_settings(repo, CACHE_TTL, CACHE_CAPACITY)
    }

    pub fn with_cache_settings(
        repo: Arc<dyn ProcessedEventRepository>,
        ttl: Duration,
        capacity: usize,
    ) -> Self {
        Self { repo, cache: Mutex::new(HashMap::new()), ttl, capacity }
    }

    /// Hot path: cache first, durable table second. A durable hit warms
    /// the cache for subsequent deliveries.
    pub async fn is_processed(&self, key: &str) -> bool {
        if self.cached(key) {
            return true;
        }

        match self.repo.exists(key).await {
            Ok(true) => {
                self.cache_key(key);
                true
            }
            Ok(false) => false,
            Err(db_error) => {
                error!(key, error = %db_error, "idempotency check failed, assuming not processed");
                false
            }
        }
    }

    /// Cache first: a crash after the durable write but before cache
    /// population then costs at worst one harmless re-check on this
    /// process. Durable failures are logged and swallowed.
    pub async fn mark_processed(&self, key: &str) {
        self.cache_key(key);

        if let Err(db_error) = self.repo.insert_if_absent(key, Utc::now()).await {
            error!(key, error = %db_error, "failed to persist processed mark");
        }
    }

    pub async fn mark_batch_processed(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        for key in keys {
            self.cache_key(key);
        }

        if let Err(db_error) = self.repo.insert_batch(keys, Utc::now()).await {
            error!(count = keys.len(), error = %db_error, "failed to persist processed batch");
        }
    }

    /// Drop ledger rows older than the retention window. Returns the
    /// number removed; a durable failure logs and reports zero.
    pub async fn cleanup(&self, older_than_days: u32) -> u64 {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(older_than_days));
        match self.repo.delete_older_than(cutoff).await {
            Ok(deleted) => {
                info!(deleted, older_than_days, "cleaned up processed-event ledger");
                deleted
            }
            Err(db_error) => {
                error!(error = %db_error, "failed to clean up processed-event ledger");
                0
            }
        }
    }

    fn cached(&self, key: &str) -> bool {
        let cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.get(key).is_some_and(|inserted| inserted.elapsed() < self.ttl)
    }

    fn cache_key(&self, key: &str) {
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };

        if cache.len() >= self.capacity {
            Self::evict(&mut cache, self.ttl, self.capacity);
        }

        cache.insert(key.to_string(), Instant::now());
    }

    fn evict(cache: &mut HashMap<String, Instant>, ttl: Duration, capacity: usize) {
        cache.retain(|_, inserted| inserted.elapsed() < ttl);

        // Still full of live entries: drop the oldest ~30% in one sweep
        // rather than one at a time.
        if cache.len() >= capacity {
            let mut entries: Vec<(String, Instant)> =
                cache.iter().map(|(key, inserted)| (key.clone(), *inserted)).collect();
            entries.sort_by_key(|(_, inserted)| *inserted);

            let to_remove = ((capacity as f64) * EVICTION_SHARE).floor() as usize;
            for (key, _) in entries.into_iter().take(to_remove.max(1)) {
                cache.remove(&key);
            }
        }
    }
}
