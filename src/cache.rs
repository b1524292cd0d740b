use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::DashboardError;
use crate::source::{DataSource, RawTable};

/// Key -> value map whose entries expire a fixed time after insertion.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get<Q>(&mut self, key: &Q, now: Instant) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let expired = match self.entries.get(key) {
            None => return None,
            Some((at, _)) => now.saturating_duration_since(*at) >= self.ttl,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(key, (now, value));
    }

    pub fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (at, _)| now.saturating_duration_since(*at) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Memoizes another source's results per query string for the cache TTL. Callers queue on the
/// cache lock, so an expired query is fetched once.
pub struct CachedSource<S> {
    inner: S,
    cache: Mutex<TtlCache<String, RawTable>>,
}

impl<S: DataSource> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Mutex::new(TtlCache::new(ttl)),
        }
    }

    pub async fn ttl(&self) -> Duration {
        self.cache.lock().await.ttl()
    }
}

impl<S: DataSource> DataSource for CachedSource<S> {
    async fn execute(&self, query: &str) -> Result<RawTable, DashboardError> {
        let mut cache = self.cache.lock().await;
        let now = Instant::now();
        if let Some(table) = cache.get(query, now) {
            tracing::debug!("fetch cache hit ({} rows)", table.rows.len());
            return Ok(table.clone());
        }

        cache.purge_expired(now);
        tracing::debug!("fetch cache miss ({} live entries)", cache.len());
        let t0 = Instant::now();
        let table = self.inner.execute(query).await?;
        tracing::info!(
            "Fetched {} rows x {} columns in {:.1}s (cached for {}s)",
            table.rows.len(),
            table.columns.len(),
            t0.elapsed().as_secs_f64(),
            cache.ttl().as_secs()
        );
        cache.insert(query.to_string(), table.clone(), Instant::now());
        Ok(table)
    }
}
