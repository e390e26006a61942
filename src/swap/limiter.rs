//! Per-profile request limits
//!
//! The counter store is injected and owned by the caller; nothing here is
//! process-global.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;

use super::error::StoreError;

/// Counter store keyed by an opaque string
#[async_trait]
pub trait RequestLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<u64, StoreError>;

    /// Increment and return the new count
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Take one slot if the count is below `limit`, atomically.
    ///
    /// Returns `false` and leaves the count unchanged when the limit is reached.
    async fn try_acquire(&self, key: &str, limit: u64) -> Result<bool, StoreError>;

    /// Give back a slot taken by `try_acquire`
    async fn release(&self, key: &str) -> Result<(), StoreError>;
}

/// Counter key for one profile on one UTC day
pub fn daily_key(profile_id: &str, day: NaiveDate) -> String {
    format!("swap:{}:{}", profile_id, day.format("%Y-%m-%d"))
}

pub fn today_key(profile_id: &str) -> String {
    daily_key(profile_id, Utc::now().date_naive())
}

#[derive(Default)]
pub struct MemoryRequestLimitStore {
    counters: DashMap<String, u64>,
}

impl MemoryRequestLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop counters for days before `today`
    pub fn prune_before(&self, today: NaiveDate) {
        let today_suffix = today.format("%Y-%m-%d").to_string();
        self.counters.retain(|key, _| {
            key.rsplit(':')
                .next()
                .is_some_and(|day| day >= today_suffix.as_str())
        });
    }
}

#[async_trait]
impl RequestLimitStore for MemoryRequestLimitStore {
    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.counters.get(key).map(|c| *c).unwrap_or(0))
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.counters.remove(key);
        Ok(())
    }

    async fn try_acquire(&self, key: &str, limit: u64) -> Result<bool, StoreError> {
        let mut counter = self.counters.entry(key.to_string()).or_insert(0);
        if *counter >= limit {
            return Ok(false);
        }
        *counter += 1;
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        if let Some(mut counter) = self.counters.get_mut(key) {
            *counter = counter.saturating_sub(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_increment_reset() {
        let store = MemoryRequestLimitStore::new();
        let key = daily_key("p-1", NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
        assert_eq!(key, "swap:p-1:2026-01-02");

        assert_eq!(store.get(&key).await.unwrap(), 0);
        assert_eq!(store.increment(&key).await.unwrap(), 1);
        assert_eq!(store.increment(&key).await.unwrap(), 2);
        assert_eq!(store.get(&key).await.unwrap(), 2);

        store.reset(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_try_acquire_and_release() {
        let store = MemoryRequestLimitStore::new();
        let key = daily_key("p-1", NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());

        assert!(store.try_acquire(&key, 2).await.unwrap());
        assert!(store.try_acquire(&key, 2).await.unwrap());
        assert!(!store.try_acquire(&key, 2).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), 2);

        store.release(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), 1);
        assert!(store.try_acquire(&key, 2).await.unwrap());

        // releasing an unknown key is a no-op
        store.release("swap:nobody:2026-01-02").await.unwrap();
        assert_eq!(store.get("swap:nobody:2026-01-02").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_before() {
        let store = MemoryRequestLimitStore::new();
        let old = daily_key("p-1", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let today = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let current = daily_key("p-1", today);
        store.increment(&old).await.unwrap();
        store.increment(&current).await.unwrap();

        store.prune_before(today);
        assert_eq!(store.get(&old).await.unwrap(), 0);
        assert_eq!(store.get(&current).await.unwrap(), 1);
    }
}
