use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use curator_core::domain::interaction::Interaction;
use curator_core::domain::measurements::BodyMeasurements;
use curator_core::domain::order::{Order, ProductOrderCount};
use curator_core::domain::product::{Product, ProductId};
use curator_core::domain::review::Review;
use curator_core::domain::user::UserId;
use curator_core::recommendations::{
    InteractionStore, MeasurementStore, OrderStore, ProductFilter, ProductStore, RecordOutcome,
    ReviewStore, StoreError,
};

#[derive(Default)]
struct Storefront {
    products: BTreeMap<ProductId, Product>,
    orders: Vec<Order>,
    reviews: HashMap<String, Review>,
    interactions: Vec<Interaction>,
    measurements: HashMap<String, BodyMeasurements>,
}

/// Process-local storefront backing every store port. Used by tests and the
/// router harness; mirrors the ordering guarantees of the SQL repositories.
#[derive(Default)]
pub struct InMemoryStorefront {
    state: RwLock<Storefront>,
}

impl InMemoryStorefront {
    /// Inserts or replaces a product. A replaced product keeps its view count.
    pub async fn upsert_product(&self, mut product: Product) {
        let mut state = self.state.write().await;
        if let Some(existing) = state.products.get(&product.id) {
            product.view_count = existing.view_count;
        }
        state.products.insert(product.id.clone(), product);
    }

    pub async fn remove_product(&self, id: &ProductId) -> bool {
        self.state.write().await.products.remove(id).is_some()
    }

    pub async fn insert_order(&self, order: Order) {
        let mut state = self.state.write().await;
        state.orders.retain(|existing| existing.id != order.id);
        state.orders.push(order);
    }

    pub async fn insert_review(&self, review: Review) {
        self.state.write().await.reviews.insert(review.id.0.clone(), review);
    }

    pub async fn upsert_measurements(&self, measurements: BodyMeasurements) {
        self.state.write().await.measurements.insert(measurements.user_id.0.clone(), measurements);
    }

    pub async fn interactions(&self) -> Vec<Interaction> {
        self.state.read().await.interactions.clone()
    }
}

fn chronological(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|left, right| {
        left.ordered_at.cmp(&right.ordered_at).then_with(|| left.id.0.cmp(&right.id.0))
    });
    orders
}

#[async_trait]
impl ProductStore for InMemoryStorefront {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.state.read().await.products.get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn find_matching(
        &self,
        filter: &ProductFilter,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        if !filter.has_predicates() {
            return Ok(Vec::new());
        }
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .filter(|product| filter.matches(product))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn top_by_views(&self, limit: usize) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> =
            self.state.read().await.products.values().cloned().collect();
        products.sort_by(|left, right| {
            right.view_count.cmp(&left.view_count).then_with(|| left.id.cmp(&right.id))
        });
        products.truncate(limit);
        Ok(products)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.products.len() as u64)
    }
}

#[async_trait]
impl OrderStore for InMemoryStorefront {
    async fn count_for_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.iter().filter(|order| &order.user_id == user_id).count() as u64)
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().await;
        Ok(chronological(
            state.orders.iter().filter(|order| &order.user_id == user_id).cloned().collect(),
        ))
    }

    async fn find_by_other_users_containing(
        &self,
        user_id: &UserId,
        products: &BTreeSet<ProductId>,
    ) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().await;
        Ok(chronological(
            state
                .orders
                .iter()
                .filter(|order| &order.user_id != user_id && order.references_any(products))
                .cloned()
                .collect(),
        ))
    }

    async fn product_order_counts(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ProductOrderCount>, StoreError> {
        let state = self.state.read().await;
        let mut counts: BTreeMap<ProductId, u64> = BTreeMap::new();
        for order in state.orders.iter().filter(|order| since.map_or(true, |from| order.ordered_at >= from)) {
            for product_id in order.distinct_products() {
                *counts.entry(product_id.clone()).or_default() += 1;
            }
        }

        let mut counts: Vec<ProductOrderCount> = counts
            .into_iter()
            .map(|(product_id, order_count)| ProductOrderCount { product_id, order_count })
            .collect();
        // BTreeMap iteration already yields id ascending; a stable sort keeps it for ties.
        counts.sort_by(|left, right| right.order_count.cmp(&left.order_count));
        counts.truncate(limit);
        Ok(counts)
    }
}

#[async_trait]
impl ReviewStore for InMemoryStorefront {
    async fn average_ratings(
        &self,
        products: &[ProductId],
    ) -> Result<BTreeMap<ProductId, f64>, StoreError> {
        let state = self.state.read().await;
        let mut totals: BTreeMap<ProductId, (u64, u64)> = BTreeMap::new();
        for review in state.reviews.values().filter(|review| products.contains(&review.product_id)) {
            let (sum, count) = totals.entry(review.product_id.clone()).or_default();
            *sum += u64::from(review.rating);
            *count += 1;
        }
        Ok(totals.into_iter().map(|(id, (sum, count))| (id, sum as f64 / count as f64)).collect())
    }
}

#[async_trait]
impl InteractionStore for InMemoryStorefront {
    async fn record_view(&self, interaction: &Interaction) -> Result<RecordOutcome, StoreError> {
        let mut state = self.state.write().await;
        let Some(product) = state.products.get_mut(&interaction.product_id) else {
            return Ok(RecordOutcome::ProductMissing);
        };
        product.view_count += 1;
        state.interactions.push(interaction.clone());
        Ok(RecordOutcome::Recorded)
    }

    async fn record(&self, interaction: &Interaction) -> Result<(), StoreError> {
        self.state.write().await.interactions.push(interaction.clone());
        Ok(())
    }
}

#[async_trait]
impl MeasurementStore for InMemoryStorefront {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BodyMeasurements>, StoreError> {
        Ok(self.state.read().await.measurements.get(&user_id.0).cloned())
    }
}
