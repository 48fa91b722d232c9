use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        id: impl Into<String>,
        product_id: ProductId,
        user_id: UserId,
        rating: u8,
    ) -> Result<Self, DomainError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(DomainError::InvalidRating { rating });
        }

        Ok(Self { id: ReviewId(id.into()), product_id, user_id, rating, created_at: Utc::now() })
    }
}

#[cfg(test)]
mod tests {
    use super::Review;
    use crate::domain::product::ProductId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    #[test]
    fn rating_must_stay_within_bounds() {
        let product = ProductId("p-1".to_owned());
        let user = UserId("u-1".to_owned());

        assert!(Review::new("r-1", product.clone(), user.clone(), 5).is_ok());
        assert_eq!(
            Review::new("r-2", product.clone(), user.clone(), 0),
            Err(DomainError::InvalidRating { rating: 0 })
        );
        assert_eq!(
            Review::new("r-3", product, user, 6),
            Err(DomainError::InvalidRating { rating: 6 })
        );
    }
}
