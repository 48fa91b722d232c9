use async_trait::async_trait;
use sqlx::Row;

use curator_core::domain::measurements::BodyMeasurements;
use curator_core::domain::user::UserId;
use curator_core::recommendations::{MeasurementStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlMeasurementRepository {
    pool: DbPool,
}

impl SqlMeasurementRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, measurements: &BodyMeasurements) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO body_measurements
                 (user_id, height, weight, chest_circumference, chest_width, waist, waist_width)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 height = excluded.height,
                 weight = excluded.weight,
                 chest_circumference = excluded.chest_circumference,
                 chest_width = excluded.chest_width,
                 waist = excluded.waist,
                 waist_width = excluded.waist_width",
        )
        .bind(&measurements.user_id.0)
        .bind(measurements.height)
        .bind(measurements.weight)
        .bind(measurements.chest_circumference)
        .bind(measurements.chest_width)
        .bind(measurements.waist)
        .bind(measurements.waist_width)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BodyMeasurements>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, height, weight, chest_circumference, chest_width, waist, waist_width
             FROM body_measurements WHERE user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(BodyMeasurements {
            user_id: UserId(row.try_get("user_id")?),
            height: row.try_get("height")?,
            weight: row.try_get("weight")?,
            chest_circumference: row.try_get("chest_circumference")?,
            chest_width: row.try_get("chest_width")?,
            waist: row.try_get("waist")?,
            waist_width: row.try_get("waist_width")?,
        }))
    }
}

#[async_trait]
impl MeasurementStore for SqlMeasurementRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BodyMeasurements>, StoreError> {
        Ok(self.fetch_by_user(user_id).await?)
    }
}
