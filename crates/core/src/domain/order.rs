use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// Placed order. Status changes never affect recommendations, so only the
/// fields the engine reads are modelled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_ids: Vec<ProductId>,
    pub total: Decimal,
    pub ordered_at: DateTime<Utc>,
}

impl Order {
    pub fn references_any(&self, products: &BTreeSet<ProductId>) -> bool {
        self.product_ids.iter().any(|id| products.contains(id))
    }

    /// Product references with in-order duplicates removed.
    pub fn distinct_products(&self) -> Vec<&ProductId> {
        let mut seen = BTreeSet::new();
        self.product_ids.iter().filter(|id| seen.insert(*id)).collect()
    }
}

/// Number of distinct orders referencing a product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOrderCount {
    pub product_id: ProductId,
    pub order_count: u64,
}
