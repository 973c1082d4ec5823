//! Short-lived cache for rendered responses.
//!
//! Entries are never invalidated by writes. They expire on their own once
//! their TTL has passed, which is checked lazily when the key is read again.

use axum::body::Bytes;
use std::{collections::HashMap, hash::Hash, time::Duration};
use tokio::{sync::RwLock, time::Instant};

#[derive(Debug)]
pub struct ResponseCache<K> {
    entries: RwLock<HashMap<K, CachedBody>>,
}

#[derive(Clone, Debug)]
struct CachedBody {
    body: Bytes,
    expires_at: Instant,
}

impl CachedBody {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

impl<K> Default for ResponseCache<K> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash> ResponseCache<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &K) -> Option<Bytes> {
        let now = Instant::now();

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_fresh(now) => return Some(entry.body.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_fresh(now)) {
            entries.remove(key);
        }

        None
    }

    pub async fn put(&self, key: K, body: Bytes, ttl: Duration) {
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_fresh(now));
        entries.insert(
            key,
            CachedBody {
                body,
                expires_at: now + ttl,
            },
        );
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::cache::ResponseCache;
    use axum::body::Bytes;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(20);

    #[tokio::test(start_paused = true)]
    async fn entries_live_for_their_ttl() {
        let cache = ResponseCache::new();
        cache.put(1, Bytes::from_static(b"page one"), TTL).await;

        assert_eq!(cache.get(&1).await, Some(Bytes::from_static(b"page one")));
        assert_eq!(cache.get(&2).await, None);

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(cache.get(&1).await, Some(Bytes::from_static(b"page one")));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn put_replaces_and_sweeps() {
        let cache = ResponseCache::new();
        cache.put(1, Bytes::from_static(b"old"), TTL).await;
        cache.put(1, Bytes::from_static(b"new"), TTL).await;
        assert_eq!(cache.get(&1).await, Some(Bytes::from_static(b"new")));

        tokio::time::advance(TTL).await;
        cache.put(2, Bytes::from_static(b"two"), TTL).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&2).await, Some(Bytes::from_static(b"two")));
    }
}
