use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::event::StoreId;
use relay_core::domain::store::Store;

use super::{parse_timestamp, RepositoryError, StoreRepository};
use crate::DbPool;

pub struct SqlStoreRepository {
    pool: DbPool,
}

impl SqlStoreRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StoreRepository for SqlStoreRepository {
    async fn find_by_id(&self, id: &StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, platform_domain, access_token,
                    daily_llm_budget_usd, monthly_llm_budget_usd, created_at
             FROM stores
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(store_from_row).transpose()
    }

    async fn save(&self, store: Store) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO stores (
                id, name, platform_domain, access_token,
                daily_llm_budget_usd, monthly_llm_budget_usd, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                platform_domain = excluded.platform_domain,
                access_token = excluded.access_token,
                daily_llm_budget_usd = excluded.daily_llm_budget_usd,
                monthly_llm_budget_usd = excluded.monthly_llm_budget_usd",
        )
        .bind(&store.id.0)
        .bind(&store.name)
        .bind(&store.platform_domain)
        .bind(&store.encrypted_access_token)
        .bind(store.daily_llm_budget_usd)
        .bind(store.monthly_llm_budget_usd)
        .bind(store.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn store_from_row(row: SqliteRow) -> Result<Store, RepositoryError> {
    Ok(Store {
        id: StoreId(row.try_get("id")?),
        name: row.try_get("name")?,
        platform_domain: row.try_get("platform_domain")?,
        encrypted_access_token: row.try_get("access_token")?,
        daily_llm_budget_usd: row.try_get("daily_llm_budget_usd")?,
        monthly_llm_budget_usd: row.try_get("monthly_llm_budget_usd")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use relay_core::domain::event::StoreId;
    use relay_core::domain::store::Store;

    use super::SqlStoreRepository;
    use crate::migrations;
    use crate::repositories::StoreRepository;
    use crate::connect_with_settings;

    #[tokio::test]
    async fn round_trips_store_with_optional_budgets() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlStoreRepository::new(pool.clone());

        let store = Store {
            id: StoreId("s-1".to_string()),
            name: "Aurora Goods".to_string(),
            platform_domain: "aurora-goods.example.com".to_string(),
            encrypted_access_token: "aa:bb:cc".to_string(),
            daily_llm_budget_usd: Some(25.0),
            monthly_llm_budget_usd: None,
            created_at: Utc::now(),
        };
        repo.save(store.clone()).await.expect("save");

        let found = repo.find_by_id(&store.id).await.expect("find").expect("exists");
        assert_eq!(found.name, "Aurora Goods");
        assert_eq!(found.daily_llm_budget_usd, Some(25.0));
        assert_eq!(found.monthly_llm_budget_usd, None);

        let mut updated = store.clone();
        updated.daily_llm_budget_usd = Some(40.0);
        repo.save(updated).await.expect("upsert");

        let found = repo.find_by_id(&store.id).await.expect("find").expect("exists");
        assert_eq!(found.daily_llm_budget_usd, Some(40.0));

        pool.close().await;
    }
}
