use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::customer::Customer;
use relay_core::domain::event::StoreId;

use super::{parse_optional_timestamp, CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_external_id(
        &self,
        store_id: &StoreId,
        external_id: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, store_id, external_id, email, total_orders, total_spent, last_order_at, tags
             FROM customers
             WHERE store_id = ? AND external_id = ?",
        )
        .bind(&store_id.0)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }

    async fn find_by_email(
        &self,
        store_id: &StoreId,
        email: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, store_id, external_id, email, total_orders, total_spent, last_order_at, tags
             FROM customers
             WHERE store_id = ? AND email = ?",
        )
        .bind(&store_id.0)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError> {
        let tags_json = serde_json::to_string(&customer.tags)
            .map_err(|error| RepositoryError::Decode(format!("tags encode: {error}")))?;

        sqlx::query(
            "INSERT INTO customers (
                id, store_id, external_id, email, total_orders, total_spent, last_order_at, tags
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                external_id = excluded.external_id,
                email = excluded.email,
                total_orders = excluded.total_orders,
                total_spent = excluded.total_spent,
                last_order_at = excluded.last_order_at,
                tags = excluded.tags",
        )
        .bind(&customer.id)
        .bind(&customer.store_id.0)
        .bind(customer.external_id.as_deref())
        .bind(customer.email.as_deref())
        .bind(customer.total_orders)
        .bind(customer.total_spent)
        .bind(customer.last_order_at.map(|value| value.to_rfc3339()))
        .bind(tags_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn customer_from_row(row: SqliteRow) -> Result<Customer, RepositoryError> {
    let tags_raw = row.try_get::<String, _>("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_raw)
        .map_err(|error| RepositoryError::Decode(format!("tags decode: {error}")))?;

    Ok(Customer {
        id: row.try_get("id")?,
        store_id: StoreId(row.try_get("store_id")?),
        external_id: row.try_get("external_id")?,
        email: row.try_get("email")?,
        total_orders: row.try_get("total_orders")?,
        total_spent: row.try_get("total_spent")?,
        last_order_at: parse_optional_timestamp("last_order_at", row.try_get("last_order_at")?)?,
        tags,
    })
}
