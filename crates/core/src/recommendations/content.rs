use crate::domain::product::Product;

use super::ports::ProductFilter;
use super::signals::price_band;

/// Attribute filter for products resembling `reference`.
///
/// Brand only participates when the reference declares one.
pub fn similar_filter(reference: &Product) -> ProductFilter {
    ProductFilter {
        exclude: [reference.id.clone()].into(),
        categories: [reference.category.clone()].into(),
        brands: reference.brand.iter().cloned().collect(),
        tags: reference.tags.clone(),
        colors: Default::default(),
        price_range: Some(price_band(reference.price)),
    }
}
