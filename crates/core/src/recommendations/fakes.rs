use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::domain::interaction::Interaction;
use crate::domain::measurements::BodyMeasurements;
use crate::domain::order::{Order, OrderId, ProductOrderCount};
use crate::domain::product::{Product, ProductId};
use crate::domain::review::Review;
use crate::domain::user::UserId;

use super::ports::{
    InteractionStore, MeasurementStore, OrderStore, ProductFilter, ProductStore, RecordOutcome,
    ReviewStore, StoreError,
};

#[derive(Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    orders: Vec<Order>,
    reviews: Vec<Review>,
    interactions: Vec<Interaction>,
    measurements: BTreeMap<UserId, BodyMeasurements>,
}

/// Test double for every store port, with a switch to simulate an outage.
#[derive(Default)]
pub struct FakeStorefront {
    state: RwLock<State>,
    unavailable: AtomicBool,
    order_count_queries: AtomicUsize,
}

impl FakeStorefront {
    pub async fn add_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id.clone(), product);
    }

    pub async fn place_order(
        &self,
        id: &str,
        user: &str,
        products: &[&str],
        ordered_at: DateTime<Utc>,
    ) {
        self.state.write().await.orders.push(Order {
            id: OrderId(id.to_owned()),
            user_id: UserId(user.to_owned()),
            product_ids: products.iter().map(|id| ProductId((*id).to_owned())).collect(),
            total: Decimal::ZERO,
            ordered_at,
        });
    }

    pub async fn add_review(&self, review: Review) {
        self.state.write().await.reviews.push(review);
    }

    pub async fn set_measurements(&self, measurements: BodyMeasurements) {
        self.state.write().await.measurements.insert(measurements.user_id.clone(), measurements);
    }

    pub async fn view_count(&self, id: &ProductId) -> Option<u64> {
        self.state.read().await.products.get(id).map(|product| product.view_count)
    }

    pub async fn interactions(&self) -> Vec<Interaction> {
        self.state.read().await.interactions.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn order_count_queries(&self) -> usize {
        self.order_count_queries.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fake storefront is offline".to_owned()));
        }
        Ok(())
    }
}

fn scan_order(orders: impl Iterator<Item = Order>) -> Vec<Order> {
    let mut orders: Vec<Order> = orders.collect();
    orders.sort_by(|left, right| {
        left.ordered_at.cmp(&right.ordered_at).then_with(|| left.id.cmp(&right.id))
    });
    orders
}

#[async_trait]
impl ProductStore for FakeStorefront {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        self.check()?;
        Ok(self.state.read().await.products.get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn find_matching(
        &self,
        filter: &ProductFilter,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.products.values().filter(|product| filter.matches(product)).take(limit).cloned().collect())
    }

    async fn top_by_views(&self, limit: usize) -> Result<Vec<Product>, StoreError> {
        self.check()?;
        let mut products: Vec<Product> = self.state.read().await.products.values().cloned().collect();
        products.sort_by(|left, right| {
            right.view_count.cmp(&left.view_count).then_with(|| left.id.cmp(&right.id))
        });
        products.truncate(limit);
        Ok(products)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.state.read().await.products.len() as u64)
    }
}

#[async_trait]
impl OrderStore for FakeStorefront {
    async fn count_for_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.orders.iter().filter(|order| &order.user_id == user_id).count() as u64)
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(scan_order(state.orders.iter().filter(|order| &order.user_id == user_id).cloned()))
    }

    async fn find_by_other_users_containing(
        &self,
        user_id: &UserId,
        products: &BTreeSet<ProductId>,
    ) -> Result<Vec<Order>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(scan_order(
            state
                .orders
                .iter()
                .filter(|order| &order.user_id != user_id && order.references_any(products))
                .cloned(),
        ))
    }

    async fn product_order_counts(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ProductOrderCount>, StoreError> {
        self.check()?;
        self.order_count_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;

        let mut counts: HashMap<ProductId, u64> = HashMap::new();
        let in_window = state.orders.iter().filter(|order| since.map_or(true, |from| order.ordered_at >= from));
        for order in in_window {
            for product_id in order.distinct_products() {
                *counts.entry(product_id.clone()).or_default() += 1;
            }
        }

        let mut counts: Vec<ProductOrderCount> = counts
            .into_iter()
            .map(|(product_id, order_count)| ProductOrderCount { product_id, order_count })
            .collect();
        counts.sort_by(|left, right| {
            right.order_count.cmp(&left.order_count).then_with(|| left.product_id.cmp(&right.product_id))
        });
        counts.truncate(limit);
        Ok(counts)
    }
}

#[async_trait]
impl ReviewStore for FakeStorefront {
    async fn average_ratings(
        &self,
        products: &[ProductId],
    ) -> Result<BTreeMap<ProductId, f64>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        let mut sums: BTreeMap<ProductId, (u64, u64)> = BTreeMap::new();
        for review in state.reviews.iter().filter(|review| products.contains(&review.product_id)) {
            let entry = sums.entry(review.product_id.clone()).or_default();
            entry.0 += u64::from(review.rating);
            entry.1 += 1;
        }
        Ok(sums.into_iter().map(|(id, (sum, count))| (id, sum as f64 / count as f64)).collect())
    }
}

#[async_trait]
impl InteractionStore for FakeStorefront {
    async fn record_view(&self, interaction: &Interaction) -> Result<RecordOutcome, StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let Some(product) = state.products.get_mut(&interaction.product_id) else {
            return Ok(RecordOutcome::ProductMissing);
        };
        product.view_count += 1;
        state.interactions.push(interaction.clone());
        Ok(RecordOutcome::Recorded)
    }

    async fn record(&self, interaction: &Interaction) -> Result<(), StoreError> {
        self.check()?;
        self.state.write().await.interactions.push(interaction.clone());
        Ok(())
    }
}

#[async_trait]
impl MeasurementStore for FakeStorefront {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BodyMeasurements>, StoreError> {
        self.check()?;
        Ok(self.state.read().await.measurements.get(user_id).cloned())
    }
}
