use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{CacheKey, RecommendationCache};
use crate::domain::product::ProductId;
use crate::domain::user::UserId;

/// Write-side notification forwarded by the storefront after a successful mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationEvent {
    ProductUpdated { product_id: ProductId },
    ProductDeleted { product_id: ProductId },
    ReviewAdded { product_id: ProductId },
    ReviewDeleted { product_id: ProductId },
    OrderPlaced { user_id: UserId },
}

impl MutationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProductUpdated { .. } => "product_updated",
            Self::ProductDeleted { .. } => "product_deleted",
            Self::ReviewAdded { .. } => "review_added",
            Self::ReviewDeleted { .. } => "review_deleted",
            Self::OrderPlaced { .. } => "order_placed",
        }
    }
}

/// Keys that were actually present when a hook ran.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub event: &'static str,
    pub invalidated: Vec<String>,
}

/// Mutation hooks over the shared cache. Every hook is idempotent.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<RecommendationCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<RecommendationCache>) -> Self {
        Self { cache }
    }

    pub fn on_product_updated(&self, product_id: &ProductId) -> InvalidationReport {
        self.invalidate("product_updated", &[CacheKey::Similar(product_id.clone()), CacheKey::Popular])
    }

    pub fn on_product_deleted(&self, product_id: &ProductId) -> InvalidationReport {
        self.invalidate("product_deleted", &[CacheKey::Similar(product_id.clone()), CacheKey::Popular])
    }

    pub fn on_review_added(&self, _product_id: &ProductId) -> InvalidationReport {
        self.invalidate("review_added", &[CacheKey::Popular])
    }

    pub fn on_review_deleted(&self, _product_id: &ProductId) -> InvalidationReport {
        self.invalidate("review_deleted", &[CacheKey::Popular])
    }

    pub fn on_order_placed(&self, user_id: &UserId) -> InvalidationReport {
        self.invalidate(
            "order_placed",
            &[CacheKey::UserRecommendations(user_id.clone()), CacheKey::Trending, CacheKey::Popular],
        )
    }

    /// Views only move the popular list while it is ranked by view counter.
    pub fn on_view_tracked(&self, popular_ranked_by_views: bool) -> InvalidationReport {
        if !popular_ranked_by_views {
            return InvalidationReport { event: "view_tracked", invalidated: Vec::new() };
        }
        self.invalidate("view_tracked", &[CacheKey::Popular])
    }

    pub fn apply(&self, event: &MutationEvent) -> InvalidationReport {
        match event {
            MutationEvent::ProductUpdated { product_id } => self.on_product_updated(product_id),
            MutationEvent::ProductDeleted { product_id } => self.on_product_deleted(product_id),
            MutationEvent::ReviewAdded { product_id } => self.on_review_added(product_id),
            MutationEvent::ReviewDeleted { product_id } => self.on_review_deleted(product_id),
            MutationEvent::OrderPlaced { user_id } => self.on_order_placed(user_id),
        }
    }

    fn invalidate(&self, event: &'static str, keys: &[CacheKey]) -> InvalidationReport {
        let invalidated: Vec<String> =
            keys.iter().filter(|key| self.cache.invalidate(key)).map(ToString::to_string).collect();

        info!(
            event_name = "cache.invalidation.applied",
            mutation = event,
            removed = invalidated.len(),
            "cache invalidation hook applied"
        );

        InvalidationReport { event, invalidated }
    }
}
