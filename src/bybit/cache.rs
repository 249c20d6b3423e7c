//! TTL cache for GET responses

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Cache key: `method:endpoint` followed by the JSON of the sorted parameters
pub fn cache_key(method: &str, endpoint: &str, params: &BTreeMap<String, String>) -> String {
    let params_json = serde_json::to_string(params).unwrap_or_default();
    format!("{}:{}{}", method, endpoint, params_json)
}

struct Entry {
    stored_at: Instant,
    ttl: Duration,
    value: serde_json::Value,
}

impl Entry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// Expired entries are swept once every this many inserts
const SWEEP_EVERY: u64 = 64;

/// Response cache keyed by [`cache_key`]
pub struct ResponseCache {
    default_ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
    inserts: AtomicU64,
}

impl ResponseCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: Mutex::new(HashMap::new()),
            inserts: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fresh value for `key`, dropping it when expired
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_fresh() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: String, value: serde_json::Value, ttl: Option<Duration>) {
        let entry = Entry {
            stored_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
            value,
        };
        let mut entries = self.entries.lock().await;
        if (self.inserts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            let before = entries.len();
            entries.retain(|_, e| e.is_fresh());
            tracing::trace!(evicted = before - entries.len(), "Swept response cache");
        }
        entries.insert(key, entry);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = params(&[("symbol", "BTCUSDT"), ("category", "spot")]);
        let b = params(&[("category", "spot"), ("symbol", "BTCUSDT")]);
        assert_eq!(
            cache_key("GET", "/v5/market/tickers", &a),
            cache_key("GET", "/v5/market/tickers", &b)
        );
        assert_eq!(
            cache_key("GET", "/v5/market/tickers", &a),
            r#"GET:/v5/market/tickers{"category":"spot","symbol":"BTCUSDT"}"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        cache.insert("k".into(), json!({"a": 1}), None).await;
        assert_eq!(cache.get("k").await, Some(json!({"a": 1})));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_sweeps_stale_keys() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        for i in 0..10 {
            cache.insert(format!("old-{}", i), json!(i), None).await;
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        // never read again, so only the sweep can drop them
        for i in 10..SWEEP_EVERY {
            cache.insert(format!("new-{}", i), json!(i), None).await;
        }
        assert_eq!(cache.len().await, (SWEEP_EVERY - 10) as usize);
        assert!(cache.get("old-0").await.is_none());
        assert_eq!(cache.get("new-10").await, Some(json!(10)));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        cache.insert("a".into(), json!(1), None).await;
        cache.insert("b".into(), json!(2), Some(Duration::from_secs(5))).await;
        assert_eq!(cache.len().await, 2);
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
