use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::domain::product::ProductId;
use crate::domain::user::UserId;

pub const TRENDING_KEY: &str = "trending:products";
pub const POPULAR_KEY: &str = "popular:products";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    Personalized,
    Similar,
    Trending,
    Popular,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    UserRecommendations(UserId),
    Similar(ProductId),
    Trending,
    Popular,
}

impl CacheKey {
    pub fn namespace(&self) -> CacheNamespace {
        match self {
            Self::UserRecommendations(_) => CacheNamespace::Personalized,
            Self::Similar(_) => CacheNamespace::Similar,
            Self::Trending => CacheNamespace::Trending,
            Self::Popular => CacheNamespace::Popular,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRecommendations(user_id) => write!(f, "user:{}:recommendations", user_id.0),
            Self::Similar(product_id) => write!(f, "similar:{}", product_id.0),
            Self::Trending => f.write_str(TRENDING_KEY),
            Self::Popular => f.write_str(POPULAR_KEY),
        }
    }
}

/// Lifetime of each namespace. Per-user lists are cheap and volatile, the
/// all-time popularity aggregate is expensive and slow-moving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    pub personalized: Duration,
    pub similar: Duration,
    pub trending: Duration,
    pub popular: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            personalized: Duration::from_secs(30 * 60),
            similar: Duration::from_secs(4 * 60 * 60),
            trending: Duration::from_secs(60 * 60),
            popular: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl TtlPolicy {
    pub fn ttl_for(&self, namespace: CacheNamespace) -> Duration {
        match namespace {
            CacheNamespace::Personalized => self.personalized,
            CacheNamespace::Similar => self.similar,
            CacheNamespace::Trending => self.trending,
            CacheNamespace::Popular => self.popular,
        }
    }
}
