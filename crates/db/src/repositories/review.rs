use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite};

use curator_core::domain::product::ProductId;
use curator_core::domain::review::{Review, ReviewId};
use curator_core::recommendations::{ReviewStore, StoreError};

use super::{encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlReviewRepository {
    pool: DbPool,
}

impl SqlReviewRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, review: &Review) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO review (id, product_id, user_id, rating, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET rating = excluded.rating",
        )
        .bind(&review.id.0)
        .bind(&review.product_id.0)
        .bind(&review.user_id.0)
        .bind(i64::from(review.rating))
        .bind(encode_timestamp(&review.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &ReviewId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM review WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_average_ratings(
        &self,
        products: &[ProductId],
    ) -> Result<BTreeMap<ProductId, f64>, RepositoryError> {
        if products.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT product_id, AVG(rating) AS average_rating FROM review WHERE product_id IN (",
        );
        let mut separated = builder.separated(", ");
        for product_id in products {
            separated.push_bind(product_id.0.clone());
        }
        builder.push(") GROUP BY product_id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let product_id: String = row.try_get("product_id")?;
                let average: f64 = row.try_get("average_rating")?;
                Ok((ProductId(product_id), average))
            })
            .collect()
    }
}

#[async_trait]
impl ReviewStore for SqlReviewRepository {
    async fn average_ratings(
        &self,
        products: &[ProductId],
    ) -> Result<BTreeMap<ProductId, f64>, StoreError> {
        Ok(self.fetch_average_ratings(products).await?)
    }
}
