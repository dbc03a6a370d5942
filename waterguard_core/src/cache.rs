//! Bounded per-key reading history
//!
//! Each key keeps its own ordered list of readings, oldest first. Locks are
//! taken per operation so status queries never wait on a whole poll cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::RwLock;

/// Readings kept per key unless configured otherwise
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// A single cached value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub key: String,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Cache of recent readings keyed by entity name
#[derive(Debug)]
pub struct EntityCache {
    max_entries: usize,
    entries: RwLock<HashMap<String, VecDeque<Reading>>>,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl EntityCache {
    /// Create a cache keeping at most `max_entries` readings per key.
    ///
    /// A limit of zero is treated as one; the newest reading is always kept.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append a reading, evicting the oldest ones past the limit
    pub async fn add_reading(
        &self,
        key: impl Into<String>,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
    ) {
        let key = key.into();
        let mut entries = self.entries.write().await;
        let readings = entries.entry(key.clone()).or_default();
        readings.push_back(Reading {
            key,
            value,
            timestamp,
        });
        while readings.len() > self.max_entries && readings.len() > 1 {
            readings.pop_front();
        }
    }

    /// Most recent reading for `key`
    pub async fn latest(&self, key: &str) -> Option<Reading> {
        self.entries
            .read()
            .await
            .get(key)
            .and_then(|readings| readings.back().cloned())
    }

    /// All readings for `key`, oldest first
    pub async fn readings(&self, key: &str) -> Vec<Reading> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|readings| readings.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `key` has a reading with an actual value
    pub async fn has_data(&self, key: &str) -> bool {
        self.latest(key)
            .await
            .is_some_and(|reading| reading.value.is_some())
    }

    /// Number of readings held per key
    pub async fn stats(&self) -> BTreeMap<String, usize> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, readings)| (key.clone(), readings.len()))
            .collect()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_newest_entries_survive_in_order(max in 1usize..16, count in 0usize..48) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let values: Vec<Option<f64>> = runtime.block_on(async {
                let cache = EntityCache::new(max);
                for i in 0..count {
                    cache.add_reading("key", Some(i as f64), Utc::now()).await;
                }
                cache.readings("key").await.into_iter().map(|r| r.value).collect()
            });

            let expected: Vec<Option<f64>> = (count.saturating_sub(max)..count)
                .map(|i| Some(i as f64))
                .collect();
            prop_assert!(values.len() <= max);
            prop_assert_eq!(values, expected);
        }
    }

    #[tokio::test]
    async fn test_eviction_keeps_newest() {
        let cache = EntityCache::new(3);
        let start = Utc::now();
        for i in 0..5 {
            cache
                .add_reading("water_alarm", Some(i as f64), start + Duration::seconds(i))
                .await;
        }

        let values: Vec<_> = cache
            .readings("water_alarm")
            .await
            .into_iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![Some(2.0), Some(3.0), Some(4.0)]);
        assert_eq!(cache.latest("water_alarm").await.unwrap().value, Some(4.0));
    }

    #[tokio::test]
    async fn test_zero_limit_keeps_last() {
        let cache = EntityCache::new(0);
        cache.add_reading("k", Some(1.0), Utc::now()).await;
        cache.add_reading("k", Some(2.0), Utc::now()).await;
        assert_eq!(cache.readings("k").await.len(), 1);
        assert_eq!(cache.latest("k").await.unwrap().value, Some(2.0));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = EntityCache::default();
        cache.add_reading("valve_status1", Some(3.0), Utc::now()).await;
        cache.add_reading("wireless_leak1", None, Utc::now()).await;

        assert!(cache.has_data("valve_status1").await);
        assert!(!cache.has_data("wireless_leak1").await);
        assert!(!cache.has_data("missing").await);

        let stats = cache.stats().await;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["valve_status1"], 1);

        cache.clear().await;
        assert!(cache.stats().await.is_empty());
    }
}
