use serde::Serialize;
use sqlx::Executor;
use tracing::info;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_PRODUCT_IDS: &[&str] = &[
    "p-tee-navy",
    "p-tee-white",
    "p-oxford",
    "p-chino",
    "p-denim",
    "p-jogger",
    "p-runner",
    "p-sneaker",
    "p-parka",
    "p-fleece",
    "p-beanie",
    "p-belt",
];

/// Orders in the demo dataset with the item count each one must carry.
const SEED_ORDERS: &[SeedOrderContract] = &[
    SeedOrderContract { id: "o-1001", user_id: "u-alice", item_count: 2 },
    SeedOrderContract { id: "o-1002", user_id: "u-alice", item_count: 1 },
    SeedOrderContract { id: "o-1003", user_id: "u-bob", item_count: 3 },
    SeedOrderContract { id: "o-1004", user_id: "u-bob", item_count: 1 },
    SeedOrderContract { id: "o-1005", user_id: "u-cara", item_count: 3 },
    SeedOrderContract { id: "o-1006", user_id: "u-cara", item_count: 2 },
    SeedOrderContract { id: "o-1007", user_id: "u-dev", item_count: 2 },
    SeedOrderContract { id: "o-1008", user_id: "u-erin", item_count: 2 },
];

const SEED_REVIEW_IDS: &[&str] = &["r-1", "r-2", "r-3", "r-4", "r-5", "r-6", "r-7"];

const SEED_MEASURED_USERS: &[&str] = &["u-alice", "u-bob"];

/// Orders the dataset places inside the default seven-day trending window.
const SEED_RECENT_ORDER_COUNT: i64 = 5;

/// Demo storefront used by `curator seed` and the integration tests.
pub struct StorefrontSeedDataset;

impl StorefrontSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/storefront_seed.sql");

    /// Loads the dataset. Safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;
        info!(
            event_name = "db.seed.loaded",
            products = SEED_PRODUCT_IDS.len(),
            orders = SEED_ORDERS.len(),
            "demo storefront dataset loaded"
        );

        Ok(SeedResult {
            products: SEED_PRODUCT_IDS.len(),
            orders: SEED_ORDERS.len(),
            reviews: SEED_REVIEW_IDS.len(),
            measured_users: SEED_MEASURED_USERS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let products: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM product WHERE id IN {}",
            sql_array_from_ids(SEED_PRODUCT_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("products", products == SEED_PRODUCT_IDS.len() as i64));

        for order in SEED_ORDERS {
            let items: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM order_item i
                 JOIN customer_order o ON o.id = i.order_id
                 WHERE o.id = ?1 AND o.user_id = ?2",
            )
            .bind(order.id)
            .bind(order.user_id)
            .fetch_one(pool)
            .await?;
            checks.push((order.id, items == order.item_count));
        }

        let reviews: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM review WHERE id IN {}",
            sql_array_from_ids(SEED_REVIEW_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("reviews", reviews == SEED_REVIEW_IDS.len() as i64));

        let measured: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM body_measurements WHERE user_id IN {}",
            sql_array_from_ids(SEED_MEASURED_USERS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("body-measurements", measured == SEED_MEASURED_USERS.len() as i64));

        let recent: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM customer_order
             WHERE id IN {} AND ordered_at >= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-7 days')",
            sql_array_from_ids(&SEED_ORDERS.iter().map(|order| order.id).collect::<Vec<_>>())
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("recent-orders", recent >= SEED_RECENT_ORDER_COUNT));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let order_ids = SEED_ORDERS.iter().map(|order| order.id).collect::<Vec<_>>();
        let statements = [
            format!("DELETE FROM review WHERE id IN {}", sql_array_from_ids(SEED_REVIEW_IDS)),
            format!("DELETE FROM customer_order WHERE id IN {}", sql_array_from_ids(&order_ids)),
            format!(
                "DELETE FROM body_measurements WHERE user_id IN {}",
                sql_array_from_ids(SEED_MEASURED_USERS)
            ),
            format!("DELETE FROM product WHERE id IN {}", sql_array_from_ids(SEED_PRODUCT_IDS)),
        ];
        for statement in &statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedOrderContract {
    id: &'static str,
    user_id: &'static str,
    item_count: i64,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedResult {
    pub products: usize,
    pub orders: usize,
    pub reviews: usize,
    pub measured_users: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_pool;

    #[test]
    fn sql_fixture_covers_every_contract_id() {
        for id in SEED_PRODUCT_IDS.iter().chain(SEED_REVIEW_IDS).chain(SEED_MEASURED_USERS) {
            assert!(StorefrontSeedDataset::SQL.contains(&format!("'{id}'")), "missing {id}");
        }
        for order in SEED_ORDERS {
            assert!(StorefrontSeedDataset::SQL.contains(&format!("'{}'", order.id)));
        }
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = test_pool().await;

        let first = StorefrontSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification =
            StorefrontSeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.products, 12);

        StorefrontSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            StorefrontSeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = test_pool().await;
        StorefrontSeedDataset::load(&pool).await.expect("load seed fixtures");

        StorefrontSeedDataset::clean(&pool).await.expect("clean seed fixtures");

        let verification = StorefrontSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let items: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM order_item")
            .fetch_one(&pool)
            .await
            .expect("count order items");
        assert_eq!(items, 0);
    }
}
