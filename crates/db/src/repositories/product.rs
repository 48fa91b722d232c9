use std::collections::BTreeSet;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use curator_core::domain::product::{Product, ProductId};
use curator_core::recommendations::{ProductFilter, ProductStore, StoreError};

use super::{decode_count, decode_decimal, decode_timestamp, encode_timestamp, sql_limit, RepositoryError};
use crate::DbPool;

const ATTRIBUTE_SEPARATOR: char = '\u{1f}';

const PRODUCT_SELECT: &str = "SELECT p.id, p.name, p.category, p.brand, p.price, p.view_count, p.created_at,
        (SELECT group_concat(tag, char(31)) FROM product_tag WHERE product_id = p.id) AS tags,
        (SELECT group_concat(color, char(31)) FROM product_color WHERE product_id = p.id) AS colors,
        (SELECT group_concat(size, char(31)) FROM product_size WHERE product_id = p.id) AS sizes
     FROM product p";

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upserts the product row and replaces its tag, color and size sets. An
    /// existing row keeps its stored `view_count`.
    pub async fn save(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO product (id, name, category, brand, price, view_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 brand = excluded.brand,
                 price = excluded.price",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(product.price.to_string())
        .bind(i64::try_from(product.view_count).unwrap_or(i64::MAX))
        .bind(encode_timestamp(&product.created_at))
        .execute(&mut *tx)
        .await?;

        let attribute_sets = [
            ("product_tag", "tag", &product.tags),
            ("product_color", "color", &product.colors),
            ("product_size", "size", &product.sizes),
        ];
        for (table, column, values) in attribute_sets {
            sqlx::query(&format!("DELETE FROM {table} WHERE product_id = ?"))
                .bind(&product.id.0)
                .execute(&mut *tx)
                .await?;
            for value in values {
                sqlx::query(&format!("INSERT INTO {table} (product_id, {column}) VALUES (?, ?)"))
                    .bind(&product.id.0)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, id: &ProductId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM product WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("{PRODUCT_SELECT} WHERE p.id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(PRODUCT_SELECT);
        builder.push(" WHERE p.id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.0.clone());
        }
        builder.push(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn fetch_matching(
        &self,
        filter: &ProductFilter,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        if !filter.has_predicates() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(PRODUCT_SELECT);
        builder.push(" WHERE (0");
        if !filter.categories.is_empty() {
            builder.push(" OR p.category IN (");
            push_values(&mut builder, &filter.categories);
            builder.push(")");
        }
        if !filter.brands.is_empty() {
            builder.push(" OR p.brand IN (");
            push_values(&mut builder, &filter.brands);
            builder.push(")");
        }
        if !filter.tags.is_empty() {
            builder.push(
                " OR EXISTS (SELECT 1 FROM product_tag t WHERE t.product_id = p.id AND t.tag IN (",
            );
            push_values(&mut builder, &filter.tags);
            builder.push("))");
        }
        if !filter.colors.is_empty() {
            builder.push(
                " OR EXISTS (SELECT 1 FROM product_color c WHERE c.product_id = p.id AND c.color IN (",
            );
            push_values(&mut builder, &filter.colors);
            builder.push("))");
        }
        if let Some((low, high)) = filter.price_range {
            builder.push(" OR CAST(p.price AS REAL) BETWEEN ");
            builder.push_bind(low.to_f64().unwrap_or(f64::MIN));
            builder.push(" AND ");
            builder.push_bind(high.to_f64().unwrap_or(f64::MAX));
        }
        builder.push(")");

        if !filter.exclude.is_empty() {
            builder.push(" AND p.id NOT IN (");
            let mut separated = builder.separated(", ");
            for id in &filter.exclude {
                separated.push_bind(id.0.clone());
            }
            builder.push(")");
        }

        builder.push(" ORDER BY p.id ASC LIMIT ");
        builder.push_bind(sql_limit(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn fetch_top_by_views(&self, limit: usize) -> Result<Vec<Product>, RepositoryError> {
        let rows =
            sqlx::query(&format!("{PRODUCT_SELECT} ORDER BY p.view_count DESC, p.id ASC LIMIT ?"))
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn fetch_count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product").fetch_one(&self.pool).await?;
        decode_count("product count", count)
    }
}

fn push_values(builder: &mut QueryBuilder<'_, Sqlite>, values: &BTreeSet<String>) {
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.clone());
    }
}

fn split_attributes(raw: Option<String>) -> BTreeSet<String> {
    raw.map(|joined| joined.split(ATTRIBUTE_SEPARATOR).map(str::to_owned).collect())
        .unwrap_or_default()
}

fn row_to_product(row: &SqliteRow) -> Result<Product, RepositoryError> {
    let decode = |error: sqlx::Error| RepositoryError::Decode(error.to_string());

    let price: String = row.try_get("price").map_err(decode)?;
    let view_count: i64 = row.try_get("view_count").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;

    Ok(Product {
        id: ProductId(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        category: row.try_get("category").map_err(decode)?,
        brand: row.try_get("brand").map_err(decode)?,
        tags: split_attributes(row.try_get("tags").map_err(decode)?),
        colors: split_attributes(row.try_get("colors").map_err(decode)?),
        sizes: split_attributes(row.try_get("sizes").map_err(decode)?),
        price: decode_decimal("price", &price)?,
        view_count: decode_count("view_count", view_count)?,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl ProductStore for SqlProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.fetch_by_id(id).await?)
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        Ok(self.fetch_by_ids(ids).await?)
    }

    async fn find_matching(
        &self,
        filter: &ProductFilter,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        Ok(self.fetch_matching(filter, limit).await?)
    }

    async fn top_by_views(&self, limit: usize) -> Result<Vec<Product>, StoreError> {
        Ok(self.fetch_top_by_views(limit).await?)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.fetch_count().await?)
    }
}
