use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::CacheNamespace;

use super::engine::RecommendationEngine;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub populated: Vec<CacheNamespace>,
    pub failed: Vec<CacheNamespace>,
}

impl WarmReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Best-effort startup pass that fills the popular and trending lists.
pub struct CacheWarmer {
    engine: Arc<RecommendationEngine>,
}

impl CacheWarmer {
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        Self { engine }
    }

    /// Never fails; problems are logged and recorded in the report.
    pub async fn warm(&self) -> WarmReport {
        info!(event_name = "cache.warm.start", "warming recommendation cache");
        let mut report = WarmReport::default();

        match self.engine.get_popular().await {
            Ok(products) => {
                info!(event_name = "cache.warm.popular", count = products.len(), "popular products warmed");
                report.populated.push(CacheNamespace::Popular);
            }
            Err(error) => {
                warn!(event_name = "cache.warm.failed", namespace = "popular", error = %error, "cache warming failed");
                report.failed.push(CacheNamespace::Popular);
            }
        }

        match self.engine.get_trending().await {
            Ok(products) => {
                info!(event_name = "cache.warm.trending", count = products.len(), "trending products warmed");
                report.populated.push(CacheNamespace::Trending);
            }
            Err(error) => {
                warn!(event_name = "cache.warm.failed", namespace = "trending", error = %error, "cache warming failed");
                report.failed.push(CacheNamespace::Trending);
            }
        }

        info!(
            event_name = "cache.warm.complete",
            populated = report.populated.len(),
            failed = report.failed.len(),
            "cache warming complete"
        );
        report
    }
}
