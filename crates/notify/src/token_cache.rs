//! TTL'd, size-bounded cache for resolved provider credentials.
//!
//! Building a notifier means reading secrets and, for some vendors, minting
//! tokens; both are too expensive to repeat per dispatched event. Entries
//! are keyed by the owning object's coordinates so the finalizer can evict
//! them on delete, guaranteeing no credential outlives its subscription.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Cache key: the owning object plus the operation the value serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub operation: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(kind: &str, name: &str, namespace: &str, operation: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            operation: operation.to_string(),
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

/// A TTL'd, capacity-bounded credential cache.
#[derive(Debug)]
pub struct TokenCache<V> {
    entries: RwLock<HashMap<CacheKey, Entry<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<V> TokenCache<V> {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Fetch a live entry.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(Arc::clone(&entry.value))
    }

    /// Insert a value, evicting expired entries first and, if still over
    /// capacity, the entry closest to expiry.
    pub async fn insert(&self, key: CacheKey, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        entries.retain(|_, e| e.expires_at > now);
        if entries.len() >= self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            Entry {
                value: Arc::clone(&value),
                expires_at: now + self.ttl,
            },
        );
        value
    }

    /// Drop every entry belonging to an object, regardless of operation.
    /// Called from subscription finalizers.
    pub async fn evict_object(&self, kind: &str, name: &str, namespace: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !(k.kind == kind && k.name == name && k.namespace == namespace));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(kind, name, namespace, removed, "evicted cached credentials");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn get_returns_inserted_until_expiry() {
        let cache: TokenCache<String> = TokenCache::new(10, TTL);
        let key = CacheKey::new("Provider", "slack", "ns", "notify");
        cache.insert(key.clone(), "tok".to_string()).await;
        assert_eq!(cache.get(&key).await.as_deref().map(String::as_str), Some("tok"));

        tokio::time::sleep(TTL + Duration::from_millis(10)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let cache: TokenCache<u32> = TokenCache::new(2, Duration::from_secs(60));
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            cache
                .insert(CacheKey::new("Provider", name, "ns", "notify"), i as u32)
                .await;
            // Distinct insertion instants for deterministic eviction order.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(cache.len().await, 2);
        assert!(cache
            .get(&CacheKey::new("Provider", "a", "ns", "notify"))
            .await
            .is_none());
        assert!(cache
            .get(&CacheKey::new("Provider", "c", "ns", "notify"))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn finalizer_eviction_clears_all_operations() {
        let cache: TokenCache<u32> = TokenCache::new(10, Duration::from_secs(60));
        cache
            .insert(CacheKey::new("Provider", "p", "ns", "notify"), 1)
            .await;
        cache
            .insert(CacheKey::new("Provider", "p", "ns", "status"), 2)
            .await;
        cache
            .insert(CacheKey::new("Provider", "other", "ns", "notify"), 3)
            .await;

        assert_eq!(cache.evict_object("Provider", "p", "ns").await, 2);
        assert_eq!(cache.len().await, 1);
    }
}
