use std::sync::Arc;
use std::time::Duration;

use crate::domain::product::{Product, ProductId};
use crate::domain::user::UserId;

use super::keys::{CacheKey, TtlPolicy};
use super::observer::{CacheObserver, TracingCacheObserver};
use super::store::{CacheStats, TtlCache, DEFAULT_MAX_ENTRIES};

/// Namespaced product-list cache shared by the engine and the invalidation hooks.
///
/// It only stores and forgets; recomputing a missing list is the caller's job.
pub struct RecommendationCache {
    store: TtlCache<Arc<[Product]>>,
    ttl: TtlPolicy,
}

impl RecommendationCache {
    pub fn new(max_entries: usize, ttl: TtlPolicy) -> Self {
        Self::with_observer(max_entries, ttl, Arc::new(TracingCacheObserver))
    }

    pub fn with_observer(
        max_entries: usize,
        ttl: TtlPolicy,
        observer: Arc<dyn CacheObserver>,
    ) -> Self {
        Self { store: TtlCache::with_observer(max_entries, observer), ttl }
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Product>> {
        self.store.get(&key.to_string()).map(|products| products.to_vec())
    }

    pub fn set(&self, key: &CacheKey, products: &[Product], ttl: Duration) {
        self.store.set(key.to_string(), Arc::from(products), ttl);
    }

    /// Stores under the TTL of the key's namespace.
    pub fn put(&self, key: &CacheKey, products: &[Product]) {
        self.set(key, products, self.ttl.ttl_for(key.namespace()));
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.store.invalidate(&key.to_string())
    }

    pub fn invalidate_user_recommendations(&self, user_id: &UserId) -> bool {
        self.invalidate(&CacheKey::UserRecommendations(user_id.clone()))
    }

    pub fn invalidate_similar(&self, product_id: &ProductId) -> bool {
        self.invalidate(&CacheKey::Similar(product_id.clone()))
    }

    pub fn invalidate_trending(&self) -> bool {
        self.invalidate(&CacheKey::Trending)
    }

    pub fn invalidate_popular(&self) -> bool {
        self.invalidate(&CacheKey::Popular)
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for RecommendationCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, TtlPolicy::default())
    }
}
