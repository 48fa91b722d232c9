pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod interactions;
pub mod recommendations;

pub use cache::{CacheKey, CacheNamespace, CacheStats, RecommendationCache, TtlPolicy};
pub use domain::interaction::{Interaction, InteractionKind};
pub use domain::order::{Order, OrderId};
pub use domain::product::{Product, ProductId};
pub use domain::user::UserId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use interactions::InteractionRecorder;
pub use recommendations::{
    CacheInvalidator, CacheWarmer, DataSources, EngineSettings, MutationEvent,
    RecommendationEngine, RecommendationError, StoreError, WarmReport,
};
