//! Recommendation cache: a bounded TTL map plus the namespace conventions
//! layered on top of it.

mod keys;
mod observer;
mod recommendation;
mod store;

pub use keys::{CacheKey, CacheNamespace, TtlPolicy, POPULAR_KEY, TRENDING_KEY};
pub use observer::{
    CacheEvent, CacheObserver, InMemoryCacheObserver, NoopCacheObserver, TracingCacheObserver,
};
pub use recommendation::RecommendationCache;
pub use store::{CacheStats, TtlCache, DEFAULT_MAX_ENTRIES};
