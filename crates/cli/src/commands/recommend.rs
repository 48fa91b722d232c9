use std::sync::Arc;

use clap::Subcommand;
use curator_core::domain::product::{Product, ProductId};
use curator_core::domain::user::UserId;
use curator_core::{EngineSettings, RecommendationCache, RecommendationEngine, RecommendationError};
use curator_db::{connect_with_config, migrations, sql_sources};

use crate::commands::{prepare, CommandFailure, CommandResult};

#[derive(Debug, Clone, Subcommand)]
pub enum RecommendTarget {
    #[command(about = "Best sellers blended with average rating")]
    Popular,
    #[command(about = "Most ordered products inside the trending window")]
    Trending,
    #[command(about = "Products sharing category, brand, tags, or price band with a product")]
    Similar { product_id: String },
    #[command(about = "Blended collaborative and content-based list for a shopper")]
    Personalized { user_id: String },
}

impl RecommendTarget {
    fn label(&self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::Trending => "trending",
            Self::Similar { .. } => "similar",
            Self::Personalized { .. } => "personalized",
        }
    }
}

pub fn run(target: RecommendTarget) -> CommandResult {
    let (config, runtime) = match prepare("recommend") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let engine = RecommendationEngine::new(
            sql_sources(&pool),
            Arc::new(RecommendationCache::new(config.cache.max_entries, config.cache.ttl_policy())),
            EngineSettings::from_config(&config.recommendations),
        );
        let products = compute(&engine, &target).await;

        pool.close().await;
        products
    });

    match result {
        Ok(products) => CommandResult::success_with_data(
            "recommend",
            format!("{} {} products", products.len(), target.label()),
            serde_json::to_value(&products).ok(),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("recommend", error_class, message, exit_code)
        }
    }
}

async fn compute(
    engine: &RecommendationEngine,
    target: &RecommendTarget,
) -> Result<Vec<Product>, CommandFailure> {
    let outcome = match target {
        RecommendTarget::Popular => engine.get_popular().await,
        RecommendTarget::Trending => engine.get_trending().await,
        RecommendTarget::Similar { product_id } => match ProductId::parse(product_id) {
            Ok(product_id) => engine.get_similar(&product_id).await,
            Err(error) => Err(error.into()),
        },
        RecommendTarget::Personalized { user_id } => match UserId::parse(user_id) {
            Ok(user_id) => engine.get_personalized(&user_id).await,
            Err(error) => Err(error.into()),
        },
    };

    outcome.map_err(failure_for)
}

fn failure_for(error: RecommendationError) -> CommandFailure {
    let (error_class, exit_code) = match &error {
        RecommendationError::Validation(_) => ("invalid_argument", 2u8),
        RecommendationError::NotFound { .. } => ("not_found", 7u8),
        RecommendationError::ComputationFailure(_) => ("computation", 8u8),
    };
    (error_class, error.to_string(), exit_code)
}

#[cfg(test)]
mod tests {
    use curator_core::errors::DomainError;
    use curator_core::RecommendationError;

    use super::failure_for;

    #[test]
    fn errors_map_to_distinct_exit_codes() {
        let missing = failure_for(RecommendationError::product_not_found("p-9"));
        let invalid = failure_for(RecommendationError::Validation(DomainError::InvalidIdentifier {
            kind: "user",
            value: " ".to_owned(),
        }));
        let failed = failure_for(RecommendationError::ComputationFailure("locked".to_owned()));

        assert_eq!((missing.0, missing.2), ("not_found", 7));
        assert_eq!((invalid.0, invalid.2), ("invalid_argument", 2));
        assert_eq!((failed.0, failed.2), ("computation", 8));
    }
}
