use std::collections::{BTreeSet, HashMap};

use crate::domain::order::Order;
use crate::domain::product::ProductId;

/// Co-purchase candidate with the number of orders it appeared in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoPurchase {
    pub product_id: ProductId,
    pub frequency: u64,
}

/// Ranks products bought alongside `purchased` by other customers.
///
/// Each order contributes at most once per product. Ties keep the order in
/// which candidates were first encountered while scanning `orders`.
pub fn rank_co_purchases(purchased: &BTreeSet<ProductId>, orders: &[Order]) -> Vec<CoPurchase> {
    let mut ranked: Vec<CoPurchase> = Vec::new();
    let mut positions: HashMap<&ProductId, usize> = HashMap::new();

    for order in orders {
        for product_id in order.distinct_products() {
            if purchased.contains(product_id) {
                continue;
            }
            match positions.get(product_id) {
                Some(&index) => ranked[index].frequency += 1,
                None => {
                    positions.insert(product_id, ranked.len());
                    ranked.push(CoPurchase { product_id: product_id.clone(), frequency: 1 });
                }
            }
        }
    }

    ranked.sort_by(|left, right| right.frequency.cmp(&left.frequency));
    ranked
}
