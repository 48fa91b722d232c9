use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::order::ProductOrderCount;
use crate::domain::product::ProductId;

use super::{ORDER_COUNT_WEIGHT, RATING_WEIGHT};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PopularityScore {
    pub product_id: ProductId,
    pub order_count: u64,
    pub average_rating: f64,
    pub score: f64,
}

/// Blends order volume with review quality and sorts by the blended score.
///
/// `counts` arrives in order-count rank; equal scores keep that rank.
pub fn score_popularity(
    counts: &[ProductOrderCount],
    ratings: &BTreeMap<ProductId, f64>,
) -> Vec<PopularityScore> {
    let mut scored: Vec<PopularityScore> = counts
        .iter()
        .map(|count| {
            let average_rating = ratings.get(&count.product_id).copied().unwrap_or(0.0);
            PopularityScore {
                product_id: count.product_id.clone(),
                order_count: count.order_count,
                average_rating,
                score: ORDER_COUNT_WEIGHT * count.order_count as f64
                    + RATING_WEIGHT * average_rating,
            }
        })
        .collect();

    scored.sort_by(|left, right| right.score.total_cmp(&left.score));
    scored
}
