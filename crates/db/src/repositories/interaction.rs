use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use curator_core::domain::interaction::{Interaction, InteractionId, InteractionKind};
use curator_core::domain::product::ProductId;
use curator_core::domain::user::UserId;
use curator_core::recommendations::{InteractionStore, RecordOutcome, StoreError};

use super::{decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlInteractionRepository {
    pool: DbPool,
}

impl SqlInteractionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Interactions for one product, oldest first.
    pub async fn list_for_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, product_id, kind, occurred_at FROM interaction
             WHERE product_id = ?
             ORDER BY occurred_at ASC, id ASC",
        )
        .bind(&product_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                let occurred_at: String = row.try_get("occurred_at")?;
                Ok(Interaction {
                    id: InteractionId(row.try_get("id")?),
                    user_id: UserId(row.try_get("user_id")?),
                    product_id: ProductId(row.try_get("product_id")?),
                    kind: kind
                        .parse::<InteractionKind>()
                        .map_err(|error| RepositoryError::Decode(error.to_string()))?,
                    occurred_at: decode_timestamp("occurred_at", &occurred_at)?,
                })
            })
            .collect()
    }

    async fn insert_view(&self, interaction: &Interaction) -> Result<RecordOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query("UPDATE product SET view_count = view_count + 1 WHERE id = ?")
            .bind(&interaction.product_id.0)
            .execute(&mut *tx)
            .await?;

        if bumped.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(
                event_name = "db.interaction.view_skipped",
                product_id = %interaction.product_id,
                "view targets a product that no longer exists"
            );
            return Ok(RecordOutcome::ProductMissing);
        }

        insert(&mut *tx, interaction).await?;
        tx.commit().await?;
        Ok(RecordOutcome::Recorded)
    }
}

async fn insert<'e, E>(executor: E, interaction: &Interaction) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO interaction (id, user_id, product_id, kind, occurred_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&interaction.id.0)
    .bind(&interaction.user_id.0)
    .bind(&interaction.product_id.0)
    .bind(interaction.kind.as_str())
    .bind(encode_timestamp(&interaction.occurred_at))
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl InteractionStore for SqlInteractionRepository {
    async fn record_view(&self, interaction: &Interaction) -> Result<RecordOutcome, StoreError> {
        Ok(self.insert_view(interaction).await?)
    }

    async fn record(&self, interaction: &Interaction) -> Result<(), StoreError> {
        Ok(insert(&self.pool, interaction).await?)
    }
}
