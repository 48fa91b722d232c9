use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use curator_core::recommendations::{DataSources, StoreError};

pub mod interaction;
pub mod measurement;
pub mod memory;
pub mod order;
pub mod product;
pub mod review;

pub use interaction::SqlInteractionRepository;
pub use measurement::SqlMeasurementRepository;
pub use memory::InMemoryStorefront;
pub use order::SqlOrderRepository;
pub use product::SqlProductRepository;
pub use review::SqlReviewRepository;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}

/// SQLite-backed implementations of every store port over one pool.
pub fn sql_sources(pool: &DbPool) -> DataSources {
    DataSources {
        products: Arc::new(SqlProductRepository::new(pool.clone())),
        orders: Arc::new(SqlOrderRepository::new(pool.clone())),
        reviews: Arc::new(SqlReviewRepository::new(pool.clone())),
        interactions: Arc::new(SqlInteractionRepository::new(pool.clone())),
        measurements: Arc::new(SqlMeasurementRepository::new(pool.clone())),
    }
}

/// Fixed-width UTC form so stored timestamps sort lexically.
pub(crate) fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn decode_decimal(field: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn decode_count(field: &str, raw: i64) -> Result<u64, RepositoryError> {
    u64::try_from(raw).map_err(|_| RepositoryError::Decode(format!("{field}: negative value {raw}")))
}

pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let pool = crate::connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    crate::migrations::run_pending(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use curator_core::recommendations::StoreError;

    use super::{decode_decimal, decode_timestamp, encode_timestamp, RepositoryError};

    #[test]
    fn timestamps_round_trip_in_sortable_form() {
        let timestamp = Utc.with_ymd_and_hms(2025, 3, 9, 8, 5, 0).single().expect("valid");
        let encoded = encode_timestamp(&timestamp);

        assert_eq!(encoded, "2025-03-09T08:05:00.000Z");
        assert_eq!(decode_timestamp("ordered_at", &encoded).expect("decodes"), timestamp);
    }

    #[test]
    fn decode_failures_name_the_field() {
        let error = decode_decimal("price", "twelve").expect_err("invalid decimal");

        assert!(error.to_string().contains("price"));
        assert!(matches!(StoreError::from(error), StoreError::Decode(_)));
    }

    #[test]
    fn database_errors_become_unavailable() {
        let error = RepositoryError::Database(sqlx::Error::PoolClosed);

        assert!(matches!(StoreError::from(error), StoreError::Unavailable(_)));
    }
}
