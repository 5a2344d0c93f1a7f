//! TTL cache holding one shared value.
//!
//! Readers get an `Arc` snapshot; a refresh swaps the slot atomically, so a
//! reader never observes a half-built value.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug)]
pub struct ManifestCache<T> {
    ttl: Duration,
    slot: RwLock<Option<(Arc<T>, Instant)>>,
}

impl<T> ManifestCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value if it was stored less than `ttl` ago.
    pub async fn get_fresh(&self) -> Option<Arc<T>> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(value, _)| Arc::clone(value))
    }

    pub async fn replace(&self, value: Arc<T>) {
        *self.slot.write().await = Some((value, Instant::now()));
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_ttl() {
        let cache = ManifestCache::new(Duration::from_secs(60));
        assert!(cache.get_fresh().await.is_none());

        cache.replace(Arc::new(7u32)).await;
        assert_eq!(cache.get_fresh().await.as_deref(), Some(&7));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get_fresh().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_clears() {
        let cache = ManifestCache::new(Duration::from_secs(60));
        cache.replace(Arc::new("a")).await;
        assert!(cache.get_fresh().await.is_some());
        cache.invalidate().await;
        assert!(cache.get_fresh().await.is_none());
    }
}
