//! Rule-based recommendation strategies and the engine that serves them
//! through the recommendation cache.

pub mod collaborative;
pub mod content;
pub mod engine;
pub mod invalidation;
pub mod popularity;
pub mod ports;
pub mod signals;
pub mod warmer;

#[cfg(test)]
pub(crate) mod fakes;

use thiserror::Error;

use crate::errors::{ApplicationError, DomainError};

pub use engine::{EngineSettings, RecommendationEngine};
pub use invalidation::{CacheInvalidator, InvalidationReport, MutationEvent};
pub use ports::{
    DataSources, InteractionStore, MeasurementStore, OrderStore, ProductFilter, ProductStore,
    RecordOutcome, ReviewStore, StoreError,
};
pub use signals::{PurchaseHistory, SignalAggregator, UserPreferences};
pub use warmer::{CacheWarmer, WarmReport};

pub const COLLABORATIVE_LIMIT: usize = 20;
pub const CONTENT_LIMIT: usize = 20;
pub const SIMILAR_LIMIT: usize = 10;
pub const POPULAR_CANDIDATES: usize = 50;
pub const POPULAR_LIMIT: usize = 20;
pub const TRENDING_LIMIT: usize = 20;
pub const PERSONALIZED_LIMIT: usize = 20;
pub const BLEND_COLLABORATIVE: usize = 12;
pub const BLEND_CONTENT: usize = 8;
pub const ORDER_COUNT_WEIGHT: f64 = 0.6;
pub const RATING_WEIGHT: f64 = 0.4;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecommendationError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("recommendation computation failed: {0}")]
    ComputationFailure(String),
}

impl RecommendationError {
    pub fn product_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { entity: "product", id: id.into() }
    }

    /// Computation failures come from transient store conditions.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ComputationFailure(_))
    }
}

impl From<StoreError> for RecommendationError {
    fn from(error: StoreError) -> Self {
        Self::ComputationFailure(error.to_string())
    }
}

impl From<RecommendationError> for ApplicationError {
    fn from(error: RecommendationError) -> Self {
        match error {
            RecommendationError::NotFound { entity, id } => Self::NotFound { entity, id },
            RecommendationError::Validation(error) => Self::Domain(error),
            RecommendationError::ComputationFailure(message) => Self::Computation(message),
        }
    }
}
