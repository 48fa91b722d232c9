use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::measurements::SizeLabel;
use crate::domain::order::{Order, ProductOrderCount};
use crate::domain::product::{Product, ProductId};
use crate::domain::user::UserId;

use super::ports::{DataSources, ProductFilter, StoreError};

/// Product references from a user's orders, in order-scan sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurchaseHistory {
    pub references: Vec<ProductId>,
    pub purchased: BTreeSet<ProductId>,
}

impl PurchaseHistory {
    pub fn from_orders(orders: &[Order]) -> Self {
        let references: Vec<ProductId> =
            orders.iter().flat_map(|order| order.product_ids.iter().cloned()).collect();
        let purchased = references.iter().cloned().collect();
        Self { references, purchased }
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Attribute profile derived from everything a user has bought.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserPreferences {
    pub purchased: BTreeSet<ProductId>,
    pub categories: BTreeSet<String>,
    pub brands: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub colors: BTreeSet<String>,
    pub average_price: Decimal,
}

impl UserPreferences {
    /// Returns `None` when no purchased reference resolves to a catalog product.
    ///
    /// The average price weighs every resolving reference, so a product bought
    /// twice counts twice.
    pub fn derive(history: &PurchaseHistory, catalog: &[Product]) -> Option<Self> {
        let by_id: BTreeMap<&ProductId, &Product> =
            catalog.iter().map(|product| (&product.id, product)).collect();

        let mut preferences = Self {
            purchased: history.purchased.clone(),
            categories: BTreeSet::new(),
            brands: BTreeSet::new(),
            tags: BTreeSet::new(),
            colors: BTreeSet::new(),
            average_price: Decimal::ZERO,
        };

        let mut total = Decimal::ZERO;
        let mut resolved = 0_u32;
        for product in history.references.iter().filter_map(|id| by_id.get(id)) {
            preferences.categories.insert(product.category.clone());
            if let Some(brand) = &product.brand {
                preferences.brands.insert(brand.clone());
            }
            preferences.tags.extend(product.tags.iter().cloned());
            preferences.colors.extend(product.colors.iter().cloned());
            total += product.price;
            resolved += 1;
        }

        if resolved == 0 {
            return None;
        }

        preferences.average_price = total / Decimal::from(resolved);
        Some(preferences)
    }

    pub fn candidate_filter(&self) -> ProductFilter {
        ProductFilter {
            exclude: self.purchased.clone(),
            categories: self.categories.clone(),
            brands: self.brands.clone(),
            tags: self.tags.clone(),
            colors: self.colors.clone(),
            price_range: Some(price_band(self.average_price)),
        }
    }
}

/// Inclusive [0.8x, 1.2x] band around a reference price.
pub fn price_band(center: Decimal) -> (Decimal, Decimal) {
    (center * Decimal::new(8, 1), center * Decimal::new(12, 1))
}

/// Single place where per-user and global signals are read from the stores.
#[derive(Clone)]
pub struct SignalAggregator {
    sources: DataSources,
}

impl SignalAggregator {
    pub fn new(sources: DataSources) -> Self {
        Self { sources }
    }

    pub async fn order_count(&self, user_id: &UserId) -> Result<u64, StoreError> {
        self.sources.orders.count_for_user(user_id).await
    }

    pub async fn purchase_history(&self, user_id: &UserId) -> Result<PurchaseHistory, StoreError> {
        let orders = self.sources.orders.find_by_user(user_id).await?;
        Ok(PurchaseHistory::from_orders(&orders))
    }

    pub async fn user_preferences(
        &self,
        history: &PurchaseHistory,
    ) -> Result<Option<UserPreferences>, StoreError> {
        if history.is_empty() {
            return Ok(None);
        }

        let ids: Vec<ProductId> = history.purchased.iter().cloned().collect();
        let catalog = self.sources.products.find_by_ids(&ids).await?;
        Ok(UserPreferences::derive(history, &catalog))
    }

    pub async fn co_purchasing_orders(
        &self,
        user_id: &UserId,
        history: &PurchaseHistory,
    ) -> Result<Vec<Order>, StoreError> {
        self.sources.orders.find_by_other_users_containing(user_id, &history.purchased).await
    }

    pub async fn order_counts(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ProductOrderCount>, StoreError> {
        self.sources.orders.product_order_counts(since, limit).await
    }

    pub async fn average_ratings(
        &self,
        products: &[ProductId],
    ) -> Result<BTreeMap<ProductId, f64>, StoreError> {
        if products.is_empty() {
            return Ok(BTreeMap::new());
        }
        self.sources.reviews.average_ratings(products).await
    }

    pub async fn size_label(&self, user_id: &UserId) -> Result<SizeLabel, StoreError> {
        let measurements = self.sources.measurements.find_by_user(user_id).await?;
        Ok(SizeLabel::from_measurements(measurements.as_ref()))
    }
}
