use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use curator_core::domain::order::{Order, OrderId, ProductOrderCount};
use curator_core::domain::product::ProductId;
use curator_core::domain::user::UserId;
use curator_core::recommendations::{OrderStore, StoreError};

use super::{decode_count, decode_decimal, decode_timestamp, encode_timestamp, sql_limit, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO customer_order (id, user_id, total, ordered_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 user_id = excluded.user_id,
                 total = excluded.total,
                 ordered_at = excluded.ordered_at",
        )
        .bind(&order.id.0)
        .bind(&order.user_id.0)
        .bind(order.total.to_string())
        .bind(encode_timestamp(&order.ordered_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_item WHERE order_id = ?")
            .bind(&order.id.0)
            .execute(&mut *tx)
            .await?;

        for (position, product_id) in order.product_ids.iter().enumerate() {
            sqlx::query("INSERT INTO order_item (order_id, position, product_id) VALUES (?, ?, ?)")
                .bind(&order.id.0)
                .bind(sql_limit(position))
                .bind(&product_id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_count_for_user(&self, user_id: &UserId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_order WHERE user_id = ?")
            .bind(&user_id.0)
            .fetch_one(&self.pool)
            .await?;
        decode_count("order count", count)
    }

    async fn fetch_by_user(&self, user_id: &UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, total, ordered_at FROM customer_order
             WHERE user_id = ?
             ORDER BY ordered_at ASC, id ASC",
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    async fn fetch_by_other_users_containing(
        &self,
        user_id: &UserId,
        products: &BTreeSet<ProductId>,
    ) -> Result<Vec<Order>, RepositoryError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT o.id, o.user_id, o.total, o.ordered_at
             FROM customer_order o
             JOIN order_item i ON i.order_id = o.id
             WHERE o.user_id <> ",
        );
        builder.push_bind(user_id.0.clone());
        builder.push(" AND i.product_id IN (");
        let mut separated = builder.separated(", ");
        for product_id in products {
            separated.push_bind(product_id.0.clone());
        }
        builder.push(") ORDER BY o.ordered_at ASC, o.id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        self.assemble(rows).await
    }

    async fn fetch_product_order_counts(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ProductOrderCount>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT i.product_id, COUNT(DISTINCT i.order_id) AS order_count
             FROM order_item i
             JOIN customer_order o ON o.id = i.order_id",
        );
        if let Some(since) = since {
            builder.push(" WHERE o.ordered_at >= ");
            builder.push_bind(encode_timestamp(&since));
        }
        builder.push(" GROUP BY i.product_id ORDER BY order_count DESC, i.product_id ASC LIMIT ");
        builder.push_bind(sql_limit(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let product_id: String = row.try_get("product_id")?;
                let order_count: i64 = row.try_get("order_count")?;
                Ok(ProductOrderCount {
                    product_id: ProductId(product_id),
                    order_count: decode_count("order_count", order_count)?,
                })
            })
            .collect()
    }

    /// Attaches line items, in position order, to already-sorted order rows.
    async fn assemble(&self, rows: Vec<SqliteRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> =
            rows.iter().map(|row| row.try_get::<String, _>("id")).collect::<Result<_, _>>()?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT order_id, product_id FROM order_item WHERE order_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in &ids {
            separated.push_bind(id.clone());
        }
        builder.push(") ORDER BY order_id ASC, position ASC");

        let mut items: HashMap<String, Vec<ProductId>> = HashMap::new();
        for row in builder.build().fetch_all(&self.pool).await? {
            let order_id: String = row.try_get("order_id")?;
            let product_id: String = row.try_get("product_id")?;
            items.entry(order_id).or_default().push(ProductId(product_id));
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let user_id: String = row.try_get("user_id")?;
                let total: String = row.try_get("total")?;
                let ordered_at: String = row.try_get("ordered_at")?;
                Ok(Order {
                    product_ids: items.remove(&id).unwrap_or_default(),
                    id: OrderId(id),
                    user_id: UserId(user_id),
                    total: decode_decimal("total", &total)?,
                    ordered_at: decode_timestamp("ordered_at", &ordered_at)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OrderStore for SqlOrderRepository {
    async fn count_for_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        Ok(self.fetch_count_for_user(user_id).await?)
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError> {
        Ok(self.fetch_by_user(user_id).await?)
    }

    async fn find_by_other_users_containing(
        &self,
        user_id: &UserId,
        products: &BTreeSet<ProductId>,
    ) -> Result<Vec<Order>, StoreError> {
        Ok(self.fetch_by_other_users_containing(user_id, products).await?)
    }

    async fn product_order_counts(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ProductOrderCount>, StoreError> {
        Ok(self.fetch_product_order_counts(since, limit).await?)
    }
}
