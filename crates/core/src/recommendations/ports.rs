use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::interaction::Interaction;
use crate::domain::measurements::BodyMeasurements;
use crate::domain::order::{Order, ProductOrderCount};
use crate::domain::product::{Product, ProductId};
use crate::domain::user::UserId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store returned undecodable data: {0}")]
    Decode(String),
}

/// Any-of attribute predicate over the catalog.
///
/// A product matches when it is not excluded and satisfies at least one of the
/// populated predicates. A filter with no predicates matches nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub exclude: BTreeSet<ProductId>,
    pub categories: BTreeSet<String>,
    pub brands: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub colors: BTreeSet<String>,
    pub price_range: Option<(Decimal, Decimal)>,
}

impl ProductFilter {
    pub fn has_predicates(&self) -> bool {
        !self.categories.is_empty()
            || !self.brands.is_empty()
            || !self.tags.is_empty()
            || !self.colors.is_empty()
            || self.price_range.is_some()
    }

    pub fn matches(&self, product: &Product) -> bool {
        if self.exclude.contains(&product.id) {
            return false;
        }

        self.categories.contains(&product.category)
            || product.brand.as_ref().is_some_and(|brand| self.brands.contains(brand))
            || !self.tags.is_disjoint(&product.tags)
            || !self.colors.is_disjoint(&product.colors)
            || self
                .price_range
                .is_some_and(|(low, high)| product.price >= low && product.price <= high)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    ProductMissing,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, StoreError>;

    /// Unknown ids are skipped; result order is unspecified.
    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;

    /// Matching products in ascending id order.
    async fn find_matching(
        &self,
        filter: &ProductFilter,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError>;

    /// View counter descending, ties by id ascending.
    async fn top_by_views(&self, limit: usize) -> Result<Vec<Product>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn count_for_user(&self, user_id: &UserId) -> Result<u64, StoreError>;

    /// Orders placed by the user, ordered-at ascending then id.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError>;

    /// Orders of users other than `user_id` referencing any of `products`,
    /// ordered-at ascending then id.
    async fn find_by_other_users_containing(
        &self,
        user_id: &UserId,
        products: &BTreeSet<ProductId>,
    ) -> Result<Vec<Order>, StoreError>;

    /// Distinct-order counts per product, count descending then id ascending.
    async fn product_order_counts(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ProductOrderCount>, StoreError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Mean rating per product. Products without reviews are absent.
    async fn average_ratings(
        &self,
        products: &[ProductId],
    ) -> Result<BTreeMap<ProductId, f64>, StoreError>;
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Appends a view and bumps the product's view counter in one transaction.
    async fn record_view(&self, interaction: &Interaction) -> Result<RecordOutcome, StoreError>;

    async fn record(&self, interaction: &Interaction) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    async fn find_by_user(&self, user_id: &UserId)
        -> Result<Option<BodyMeasurements>, StoreError>;
}

/// The collaborators the engine reads from, bundled for injection.
#[derive(Clone)]
pub struct DataSources {
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub interactions: Arc<dyn InteractionStore>,
    pub measurements: Arc<dyn MeasurementStore>,
}

impl DataSources {
    /// Uses one backing store for every port.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ProductStore
            + OrderStore
            + ReviewStore
            + InteractionStore
            + MeasurementStore
            + 'static,
    {
        Self {
            products: store.clone(),
            orders: store.clone(),
            reviews: store.clone(),
            interactions: store.clone(),
            measurements: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::ProductFilter;
    use crate::domain::product::{Product, ProductId};

    #[test]
    fn empty_filter_matches_nothing() {
        let filter = ProductFilter::default();
        let product = Product::new("p-1", "Tee", "tops", Decimal::new(2000, 2));

        assert!(!filter.has_predicates());
        assert!(!filter.matches(&product));
    }

    #[test]
    fn any_single_predicate_is_enough() {
        let product = Product::new("p-1", "Tee", "tops", Decimal::new(2000, 2))
            .with_colors(["navy"])
            .with_tags(["cotton"]);

        let by_color =
            ProductFilter { colors: ["navy".to_owned()].into(), ..ProductFilter::default() };
        let by_price = ProductFilter {
            price_range: Some((Decimal::new(1600, 2), Decimal::new(2400, 2))),
            ..ProductFilter::default()
        };
        let miss = ProductFilter {
            categories: ["shoes".to_owned()].into(),
            brands: ["Acme".to_owned()].into(),
            ..ProductFilter::default()
        };

        assert!(by_color.matches(&product));
        assert!(by_price.matches(&product));
        assert!(!miss.matches(&product));
    }

    #[test]
    fn exclusions_override_matches() {
        let product = Product::new("p-1", "Tee", "tops", Decimal::new(2000, 2));
        let filter = ProductFilter {
            exclude: [ProductId("p-1".to_owned())].into(),
            categories: ["tops".to_owned()].into(),
            ..ProductFilter::default()
        };

        assert!(!filter.matches(&product));
    }
}
