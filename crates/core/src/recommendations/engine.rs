use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::cache::{CacheKey, RecommendationCache};
use crate::config::RecommendationConfig;
use crate::domain::interaction::Interaction;
use crate::domain::product::{Product, ProductId};
use crate::domain::user::UserId;
use crate::interactions::InteractionRecorder;

use super::collaborative::rank_co_purchases;
use super::content::similar_filter;
use super::invalidation::CacheInvalidator;
use super::popularity::score_popularity;
use super::ports::DataSources;
use super::signals::{PurchaseHistory, SignalAggregator};
use super::{
    RecommendationError, BLEND_COLLABORATIVE, BLEND_CONTENT, COLLABORATIVE_LIMIT, CONTENT_LIMIT,
    PERSONALIZED_LIMIT, POPULAR_CANDIDATES, POPULAR_LIMIT, SIMILAR_LIMIT, TRENDING_LIMIT,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub trending_window: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { trending_window: Duration::days(7) }
    }
}

impl EngineSettings {
    pub fn from_config(config: &RecommendationConfig) -> Self {
        Self { trending_window: Duration::days(config.trending_window_days) }
    }
}

/// Serves every recommendation list through the shared cache.
///
/// Reads check the cache first; a miss computes the list from the stores and
/// stores it under the namespace TTL. Failed computations are never cached.
pub struct RecommendationEngine {
    sources: DataSources,
    signals: SignalAggregator,
    recorder: InteractionRecorder,
    cache: Arc<RecommendationCache>,
    invalidator: CacheInvalidator,
    settings: EngineSettings,
    popular_ranked_by_views: AtomicBool,
}

impl RecommendationEngine {
    pub fn new(
        sources: DataSources,
        cache: Arc<RecommendationCache>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            signals: SignalAggregator::new(sources.clone()),
            recorder: InteractionRecorder::new(&sources),
            invalidator: CacheInvalidator::new(cache.clone()),
            sources,
            cache,
            settings,
            popular_ranked_by_views: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &Arc<RecommendationCache> {
        &self.cache
    }

    pub fn invalidator(&self) -> &CacheInvalidator {
        &self.invalidator
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub async fn get_personalized(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Product>, RecommendationError> {
        let key = CacheKey::UserRecommendations(user_id.clone());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        if self.signals.order_count(user_id).await? == 0 {
            debug!(
                event_name = "recommendations.personalized.cold_start",
                user_id = %user_id,
                "user has no orders, serving popular products"
            );
            return self.get_popular().await;
        }

        let history = self.signals.purchase_history(user_id).await?;
        if history.is_empty() {
            return self.get_popular().await;
        }

        let (collaborative, content) = tokio::try_join!(
            self.collaborative_for(user_id, &history),
            self.content_for(&history),
        )?;
        let size = self.signals.size_label(user_id).await?;

        let personalized: Vec<Product> = blend(collaborative, content)
            .into_iter()
            .filter(|product| product.fits_size(size.as_str()))
            .take(PERSONALIZED_LIMIT)
            .collect();

        self.cache.put(&key, &personalized);
        info!(
            event_name = "recommendations.personalized.computed",
            user_id = %user_id,
            size = size.as_str(),
            count = personalized.len(),
            "personalized recommendations computed"
        );
        Ok(personalized)
    }

    pub async fn get_collaborative(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Product>, RecommendationError> {
        let history = self.signals.purchase_history(user_id).await?;
        self.collaborative_for(user_id, &history).await
    }

    pub async fn get_content_based(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Product>, RecommendationError> {
        let history = self.signals.purchase_history(user_id).await?;
        self.content_for(&history).await
    }

    pub async fn get_similar(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<Product>, RecommendationError> {
        let key = CacheKey::Similar(product_id.clone());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let reference = self
            .sources
            .products
            .find_by_id(product_id)
            .await?
            .ok_or_else(|| RecommendationError::product_not_found(product_id.as_str()))?;

        let similar =
            self.sources.products.find_matching(&similar_filter(&reference), SIMILAR_LIMIT).await?;
        self.cache.put(&key, &similar);
        Ok(similar)
    }

    pub async fn get_popular(&self) -> Result<Vec<Product>, RecommendationError> {
        if let Some(cached) = self.cache.get(&CacheKey::Popular) {
            return Ok(cached);
        }

        let counts = self.signals.order_counts(None, POPULAR_CANDIDATES).await?;
        let ranked_by_views = counts.is_empty();
        let popular = if ranked_by_views {
            info!(
                event_name = "recommendations.popular.view_fallback",
                "no orders found, ranking products by view count"
            );
            self.sources.products.top_by_views(POPULAR_LIMIT).await?
        } else {
            let candidates: Vec<ProductId> =
                counts.iter().map(|count| count.product_id.clone()).collect();
            let ratings = self.signals.average_ratings(&candidates).await?;
            let top: Vec<ProductId> = score_popularity(&counts, &ratings)
                .into_iter()
                .take(POPULAR_LIMIT)
                .map(|scored| scored.product_id)
                .collect();
            self.resolve_in_order(&top).await?
        };

        self.cache.put(&CacheKey::Popular, &popular);
        self.popular_ranked_by_views.store(ranked_by_views, Ordering::SeqCst);
        Ok(popular)
    }

    pub async fn get_trending(&self) -> Result<Vec<Product>, RecommendationError> {
        if let Some(cached) = self.cache.get(&CacheKey::Trending) {
            return Ok(cached);
        }

        let since = Utc::now() - self.settings.trending_window;
        let counts = self.signals.order_counts(Some(since), TRENDING_LIMIT).await?;
        let ids: Vec<ProductId> = counts.into_iter().map(|count| count.product_id).collect();
        let trending = self.resolve_in_order(&ids).await?;

        if trending.is_empty() {
            info!(
                event_name = "recommendations.trending.popular_fallback",
                window_days = self.settings.trending_window.num_days(),
                "no orders in trending window, serving popular products"
            );
            return self.get_popular().await;
        }

        self.cache.put(&CacheKey::Trending, &trending);
        Ok(trending)
    }

    pub async fn track_view(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<Interaction, RecommendationError> {
        let interaction = self.recorder.record_view(user_id, product_id).await?;
        self.invalidator.on_view_tracked(self.popular_ranked_by_views.load(Ordering::SeqCst));
        Ok(interaction)
    }

    pub async fn track_click(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<Interaction, RecommendationError> {
        self.recorder.record_click(user_id, product_id).await
    }

    async fn collaborative_for(
        &self,
        user_id: &UserId,
        history: &PurchaseHistory,
    ) -> Result<Vec<Product>, RecommendationError> {
        if history.is_empty() {
            return Ok(Vec::new());
        }

        let orders = self.signals.co_purchasing_orders(user_id, history).await?;
        let ranked: Vec<ProductId> = rank_co_purchases(&history.purchased, &orders)
            .into_iter()
            .map(|candidate| candidate.product_id)
            .collect();

        let mut products = self.resolve_in_order(&ranked).await?;
        products.truncate(COLLABORATIVE_LIMIT);
        Ok(products)
    }

    async fn content_for(
        &self,
        history: &PurchaseHistory,
    ) -> Result<Vec<Product>, RecommendationError> {
        let Some(preferences) = self.signals.user_preferences(history).await? else {
            return Ok(Vec::new());
        };

        Ok(self.sources.products.find_matching(&preferences.candidate_filter(), CONTENT_LIMIT).await?)
    }

    /// Loads products keeping the order of `ids`; ids without a product are dropped.
    async fn resolve_in_order(&self, ids: &[ProductId]) -> Result<Vec<Product>, RecommendationError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<ProductId, Product> = self
            .sources
            .products
            .find_by_ids(ids)
            .await?
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

/// Collaborative picks first, then content picks, without repeating a product.
fn blend(collaborative: Vec<Product>, content: Vec<Product>) -> Vec<Product> {
    let mut seen = BTreeSet::new();
    collaborative
        .into_iter()
        .take(BLEND_COLLABORATIVE)
        .chain(content.into_iter().take(BLEND_CONTENT))
        .filter(|product| seen.insert(product.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{blend, EngineSettings, RecommendationEngine};
    use crate::cache::{CacheKey, RecommendationCache};
    use crate::domain::measurements::BodyMeasurements;
    use crate::domain::product::{Product, ProductId};
    use crate::domain::review::Review;
    use crate::domain::user::UserId;
    use crate::recommendations::fakes::FakeStorefront;
    use crate::recommendations::ports::DataSources;
    use crate::recommendations::RecommendationError;

    fn engine(store: &Arc<FakeStorefront>) -> RecommendationEngine {
        RecommendationEngine::new(
            DataSources::from_store(store.clone()),
            Arc::new(RecommendationCache::default()),
            EngineSettings::default(),
        )
    }

    fn product(id: &str, category: &str, cents: i64) -> Product {
        Product::new(id, format!("Product {id}"), category, Decimal::new(cents, 2))
    }

    fn ids(products: &[Product]) -> Vec<&str> {
        products.iter().map(|product| product.id.as_str()).collect()
    }

    fn user(id: &str) -> UserId {
        UserId(id.to_owned())
    }

    fn days_ago(days: i64) -> chrono::DateTime<Utc> {
        Utc::now() - Duration::days(days)
    }

    #[tokio::test]
    async fn popular_without_orders_ranks_by_views() {
        let store = Arc::new(FakeStorefront::default());
        for index in 0..25_u64 {
            store
                .add_product(product(&format!("p-{index:02}"), "tops", 1000).with_view_count(index % 7))
                .await;
        }

        let popular = engine(&store).get_popular().await.expect("popular computed");

        assert_eq!(popular.len(), 20);
        assert!(popular.windows(2).all(|pair| pair[0].view_count >= pair[1].view_count));
        assert_eq!(popular[0].id.as_str(), "p-06");
    }

    #[tokio::test]
    async fn popular_blends_orders_and_ratings_then_serves_from_cache() {
        let store = Arc::new(FakeStorefront::default());
        for id in ["p-1", "p-2", "p-3"] {
            store.add_product(product(id, "tops", 1000)).await;
        }
        store.place_order("o-1", "u-a", &["p-1", "p-2"], days_ago(30)).await;
        store.place_order("o-2", "u-b", &["p-1", "p-3"], days_ago(30)).await;
        store.place_order("o-3", "u-c", &["p-1"], days_ago(30)).await;
        store
            .add_review(Review::new("r-1", ProductId("p-3".to_owned()), user("u-b"), 5).expect("rating"))
            .await;

        let engine = engine(&store);
        let popular = engine.get_popular().await.expect("popular computed");
        let again = engine.get_popular().await.expect("popular cached");

        // p-1: 1.8, p-3: 0.6 + 2.0, p-2: 0.6
        assert_eq!(ids(&popular), vec!["p-3", "p-1", "p-2"]);
        assert_eq!(again, popular);
        assert_eq!(store.order_count_queries(), 1);
    }

    #[tokio::test]
    async fn trending_falls_back_to_popular_without_caching_itself() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "tops", 1000)).await;
        store.add_product(product("p-2", "tops", 1000)).await;
        store.place_order("o-1", "u-a", &["p-2"], days_ago(20)).await;

        let engine = engine(&store);
        let trending = engine.get_trending().await.expect("trending computed");
        let popular = engine.get_popular().await.expect("popular computed");

        assert_eq!(trending, popular);
        assert_eq!(ids(&trending), vec!["p-2"]);
        assert!(engine.cache().get(&CacheKey::Trending).is_none());
    }

    #[tokio::test]
    async fn trending_counts_only_recent_orders() {
        let store = Arc::new(FakeStorefront::default());
        for id in ["p-1", "p-2", "p-3"] {
            store.add_product(product(id, "tops", 1000)).await;
        }
        store.place_order("o-1", "u-a", &["p-1"], days_ago(30)).await;
        store.place_order("o-2", "u-b", &["p-1"], days_ago(30)).await;
        store.place_order("o-3", "u-c", &["p-3", "p-2"], days_ago(2)).await;
        store.place_order("o-4", "u-d", &["p-3"], days_ago(1)).await;

        let engine = engine(&store);
        let trending = engine.get_trending().await.expect("trending computed");

        assert_eq!(ids(&trending), vec!["p-3", "p-2"]);
        assert_eq!(engine.cache().get(&CacheKey::Trending), Some(trending));
    }

    #[tokio::test]
    async fn collaborative_recommends_co_purchases_only() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "tops", 1000)).await;
        store.add_product(product("p-2", "shoes", 5000)).await;
        store.place_order("o-1", "u-a", &["p-1"], days_ago(3)).await;
        store.place_order("o-2", "u-b", &["p-1", "p-2"], days_ago(2)).await;

        let collaborative =
            engine(&store).get_collaborative(&user("u-a")).await.expect("collaborative computed");

        assert_eq!(ids(&collaborative), vec!["p-2"]);
    }

    #[tokio::test]
    async fn collaborative_drops_deleted_products() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "tops", 1000)).await;
        store.add_product(product("p-3", "tops", 1000)).await;
        store.place_order("o-1", "u-a", &["p-1"], days_ago(3)).await;
        store.place_order("o-2", "u-b", &["p-1", "p-2", "p-2"], days_ago(2)).await;
        store.place_order("o-3", "u-c", &["p-1", "p-3"], days_ago(1)).await;

        let collaborative =
            engine(&store).get_collaborative(&user("u-a")).await.expect("collaborative computed");

        assert_eq!(ids(&collaborative), vec!["p-3"]);
    }

    #[tokio::test]
    async fn content_based_matches_any_attribute_and_skips_purchases() {
        let store = Arc::new(FakeStorefront::default());
        store
            .add_product(product("p-1", "shirts", 4000).with_brand("Northwind").with_colors(["navy"]))
            .await;
        store.add_product(product("p-2", "shirts", 9900)).await;
        store.add_product(product("p-3", "shoes", 9900).with_brand("Northwind")).await;
        store.add_product(product("p-4", "bags", 9900).with_colors(["navy"])).await;
        store.add_product(product("p-5", "bags", 4500)).await;
        store.add_product(product("p-6", "bags", 9900)).await;
        store.place_order("o-1", "u-a", &["p-1"], days_ago(3)).await;

        let content = engine(&store).get_content_based(&user("u-a")).await.expect("content computed");

        assert_eq!(ids(&content), vec!["p-2", "p-3", "p-4", "p-5"]);
    }

    #[tokio::test]
    async fn content_based_without_orders_is_empty() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "shirts", 4000)).await;

        let content = engine(&store).get_content_based(&user("u-a")).await.expect("content computed");

        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn similar_requires_existing_reference_and_is_cached() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "shirts", 4000)).await;
        store.add_product(product("p-2", "shirts", 9900)).await;
        store.add_product(product("p-3", "shoes", 9900)).await;

        let engine = engine(&store);
        let missing = engine.get_similar(&ProductId("nope".to_owned())).await;
        let similar = engine.get_similar(&ProductId("p-1".to_owned())).await.expect("similar computed");

        assert!(matches!(missing, Err(RecommendationError::NotFound { entity: "product", .. })));
        assert_eq!(ids(&similar), vec!["p-2"]);
        assert_eq!(engine.cache().get(&CacheKey::Similar(ProductId("p-1".to_owned()))), Some(similar));
    }

    #[tokio::test]
    async fn cold_start_user_gets_popular_and_no_user_entry() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "tops", 1000).with_view_count(2)).await;
        store.add_product(product("p-2", "tops", 1000).with_view_count(9)).await;

        let engine = engine(&store);
        let personalized = engine.get_personalized(&user("new")).await.expect("personalized");
        let popular = engine.get_popular().await.expect("popular");

        assert_eq!(personalized, popular);
        assert!(engine.cache().get(&CacheKey::UserRecommendations(user("new"))).is_none());
    }

    #[tokio::test]
    async fn personalized_blends_dedupes_and_filters_by_size() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "shirts", 4000).with_sizes(["S", "M"])).await;
        store.add_product(product("p-2", "shirts", 4200).with_sizes(["S"])).await;
        store.add_product(product("p-3", "shirts", 4100).with_sizes(["L"])).await;
        store.add_product(product("p-4", "shirts", 3900)).await;
        store.place_order("o-1", "u-a", &["p-1"], days_ago(5)).await;
        store.place_order("o-2", "u-b", &["p-1", "p-3", "p-2"], days_ago(4)).await;
        store
            .set_measurements(BodyMeasurements {
                user_id: user("u-a"),
                height: 165.0,
                weight: 55.0,
                chest_circumference: None,
                chest_width: Some(32.0),
                waist: Some(30.0),
                waist_width: None,
            })
            .await;

        let engine = engine(&store);
        let personalized = engine.get_personalized(&user("u-a")).await.expect("personalized");

        // collaborative [p-3, p-2], content [p-2, p-3, p-4]; p-3 is L only
        assert_eq!(ids(&personalized), vec!["p-2", "p-4"]);
        assert_eq!(
            engine.cache().get(&CacheKey::UserRecommendations(user("u-a"))),
            Some(personalized)
        );
    }

    #[tokio::test]
    async fn failed_computation_is_not_cached() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "tops", 1000)).await;
        store.place_order("o-1", "u-a", &["p-1"], days_ago(1)).await;
        store.set_unavailable(true);

        let engine = engine(&store);
        let personalized = engine.get_personalized(&user("u-a")).await;
        let popular = engine.get_popular().await;

        assert!(matches!(personalized, Err(RecommendationError::ComputationFailure(_))));
        assert!(matches!(popular, Err(RecommendationError::ComputationFailure(_))));
        assert_eq!(engine.cache().stats().entries, 0);

        store.set_unavailable(false);
        assert_eq!(ids(&engine.get_popular().await.expect("recovered")), vec!["p-1"]);
    }

    #[tokio::test]
    async fn views_refresh_popular_only_while_view_ranked() {
        let store = Arc::new(FakeStorefront::default());
        store.add_product(product("p-1", "tops", 1000).with_view_count(1)).await;
        store.add_product(product("p-2", "tops", 1000)).await;

        let engine = engine(&store);
        assert_eq!(ids(&engine.get_popular().await.expect("popular")), vec!["p-1", "p-2"]);

        let p2 = ProductId("p-2".to_owned());
        engine.track_view(&user("u-a"), &p2).await.expect("view");
        engine.track_view(&user("u-b"), &p2).await.expect("view");
        assert_eq!(ids(&engine.get_popular().await.expect("popular")), vec!["p-2", "p-1"]);

        store.place_order("o-1", "u-a", &["p-1"], days_ago(1)).await;
        engine.invalidator().on_order_placed(&user("u-a"));
        assert_eq!(ids(&engine.get_popular().await.expect("popular")), vec!["p-1"]);

        engine.track_view(&user("u-a"), &p2).await.expect("view");
        assert!(engine.cache().get(&CacheKey::Popular).is_some());
    }

    #[test]
    fn blend_caps_each_source_and_keeps_first_occurrence() {
        let collaborative: Vec<Product> =
            (0..15).map(|index| product(&format!("c-{index:02}"), "tops", 1000)).collect();
        let mut content: Vec<Product> =
            (0..10).map(|index| product(&format!("k-{index:02}"), "tops", 1000)).collect();
        content.insert(0, product("c-00", "tops", 1000));

        let blended = blend(collaborative, content);

        assert_eq!(blended.len(), 19);
        assert_eq!(blended[11].id.as_str(), "c-11");
        assert_eq!(blended[12].id.as_str(), "k-00");
    }
}
