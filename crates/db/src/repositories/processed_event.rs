use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{ProcessedEventRepository, RepositoryError};
use crate::DbPool;

/// Durable half of the idempotency ledger. Inserts are no-ops on
/// conflict, so replays never fail.
pub struct SqlProcessedEventRepository {
    pool: DbPool,
}

impl SqlProcessedEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProcessedEventRepository for SqlProcessedEventRepository {
    async fn insert_if_absent(
        &self,
        key: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO processed_events (event_key, processed_at)
             VALUES (?, ?)
             ON CONFLICT(event_key) DO NOTHING",
        )
        .bind(key)
        .bind(processed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM processed_events WHERE event_key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<i64, _>("count")? > 0)
    }

    async fn insert_batch(
        &self,
        keys: &[String],
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let timestamp = processed_at.to_rfc3339();
        for key in keys {
            sqlx::query(
                "INSERT INTO processed_events (event_key, processed_at)
                 VALUES (?, ?)
                 ON CONFLICT(event_key) DO NOTHING",
            )
            .bind(key)
            .bind(&timestamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::SqlProcessedEventRepository;
    use crate::migrations;
    use crate::repositories::ProcessedEventRepository;
    use crate::connect_with_settings;

    #[tokio::test]
    async fn insert_if_absent_reports_first_insert_only() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlProcessedEventRepository::new(pool.clone());

        let now = Utc::now();
        assert!(repo.insert_if_absent("agent:e-1", now).await.expect("first insert"));
        assert!(!repo.insert_if_absent("agent:e-1", now).await.expect("conflicting insert"));
        assert!(repo.exists("agent:e-1").await.expect("exists"));
        assert!(!repo.exists("agent:e-2").await.expect("missing"));

        pool.close().await;
    }

    #[tokio::test]
    async fn batch_insert_and_retention_cleanup() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlProcessedEventRepository::new(pool.clone());

        let old = Utc::now() - Duration::days(10);
        let keys: Vec<String> = (0..3).map(|index| format!("agent:batch-{index}")).collect();
        repo.insert_batch(&keys, old).await.expect("batch insert");
        repo.insert_if_absent("agent:fresh", Utc::now()).await.expect("fresh insert");

        let removed = repo
            .delete_older_than(Utc::now() - Duration::days(7))
            .await
            .expect("cleanup");
        assert_eq!(removed, 3);
        assert!(repo.exists("agent:fresh").await.expect("fresh survives"));

        pool.close().await;
    }
}
