use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::event::StoreId;
use relay_core::domain::order::Order;

use super::{parse_json, parse_optional_timestamp, OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn recent_for_customer(
        &self,
        store_id: &StoreId,
        customer_external_id: &str,
        limit: u32,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT store_id, external_order_id, customer_external_id, total_price, line_items, placed_at
             FROM orders
             WHERE store_id = ? AND customer_external_id = ?
             ORDER BY placed_at DESC
             LIMIT ?",
        )
        .bind(&store_id.0)
        .bind(customer_external_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(order_from_row).collect()
    }

    async fn save(&self, order: Order) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO orders (
                store_id, external_order_id, customer_external_id, total_price, line_items, placed_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(store_id, external_order_id) DO UPDATE SET
                customer_external_id = excluded.customer_external_id,
                total_price = excluded.total_price,
                line_items = excluded.line_items,
                placed_at = excluded.placed_at",
        )
        .bind(&order.store_id.0)
        .bind(&order.external_order_id)
        .bind(order.customer_external_id.as_deref())
        .bind(order.total_price)
        .bind(order.line_items.to_string())
        .bind(order.placed_at.map(|value| value.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn order_from_row(row: SqliteRow) -> Result<Order, RepositoryError> {
    Ok(Order {
        store_id: StoreId(row.try_get("store_id")?),
        external_order_id: row.try_get("external_order_id")?,
        customer_external_id: row.try_get("customer_external_id")?,
        total_price: row.try_get("total_price")?,
        line_items: parse_json("line_items", row.try_get("line_items")?)?,
        placed_at: parse_optional_timestamp("placed_at", row.try_get("placed_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use relay_core::domain::event::StoreId;
    use relay_core::domain::order::Order;

    use super::SqlOrderRepository;
    use crate::migrations;
    use crate::repositories::OrderRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn recent_for_customer_is_newest_first_and_bounded() {
        let pool = setup_pool().await;
        let store_id = store_fixture(&pool, "s-o-1").await;
        let repo = SqlOrderRepository::new(pool.clone());

        let base = Utc::now();
        for index in 0..4 {
            repo.save(Order {
                store_id: store_id.clone(),
                external_order_id: format!("o-{index}"),
                customer_external_id: Some("82411".to_string()),
                total_price: 10.0 * f64::from(index),
                line_items: json!([{"sku": "A"}]),
                placed_at: Some(base - Duration::days(i64::from(index))),
            })
            .await
            .expect("save order");
        }

        let recent =
            repo.recent_for_customer(&store_id, "82411", 2).await.expect("recent orders");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].external_order_id, "o-0");
        assert_eq!(recent[1].external_order_id, "o-1");

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn store_fixture(pool: &DbPool, id: &str) -> StoreId {
        sqlx::query(
            "INSERT INTO stores (id, name, platform_domain, access_token, created_at)
             VALUES (?, 'Test Store', 'test.example.com', 'enc', ?)",
        )
        .bind(id)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("insert store");
        StoreId(id.to_string())
    }
}
