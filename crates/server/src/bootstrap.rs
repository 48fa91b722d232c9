use std::sync::Arc;

use curator_core::config::{AppConfig, ConfigError};
use curator_core::{
    CacheWarmer, EngineSettings, RecommendationCache, RecommendationEngine, WarmReport,
};
use curator_db::{connect_with_config, migrations, sql_sources, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<RecommendationEngine>,
    pub warm_report: Option<WarmReport>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Connects, migrates, wires the engine and, when enabled, warms the cache
/// before anything starts accepting requests.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let cache = Arc::new(RecommendationCache::new(config.cache.max_entries, config.cache.ttl_policy()));
    let engine = Arc::new(RecommendationEngine::new(
        sql_sources(&db_pool),
        cache,
        EngineSettings::from_config(&config.recommendations),
    ));

    let warm_report = if config.recommendations.warm_on_start {
        Some(CacheWarmer::new(engine.clone()).warm().await)
    } else {
        None
    };

    Ok(Application { config, db_pool, engine, warm_report })
}
