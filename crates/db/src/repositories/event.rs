use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::event::{Event, EventKind, EventSource, StoreId};

use super::{parse_json, parse_optional_timestamp, parse_timestamp, EventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEventRepository {
    pool: DbPool,
}

impl SqlEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventRepository for SqlEventRepository {
    async fn save(&self, event: Event) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO events (
                id,
                store_id,
                external_event_id,
                kind,
                source,
                payload,
                received_at,
                processed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&event.id)
        .bind(&event.store_id.0)
        .bind(event.external_event_id.as_deref())
        .bind(event.kind.as_str())
        .bind(event.source.as_str())
        .bind(event.payload.to_string())
        .bind(event.received_at.to_rfc3339())
        .bind(event.processed_at.map(|value| value.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, store_id, external_event_id, kind, source, payload, received_at, processed_at
             FROM events
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(event_from_row).transpose()
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE events SET processed_at = ? WHERE id = ?")
            .bind(processed_at.to_rfc3339())
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn recent_for_customer(
        &self,
        store_id: &StoreId,
        email: &str,
        limit: u32,
    ) -> Result<Vec<Event>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, store_id, external_event_id, kind, source, payload, received_at, processed_at
             FROM events
             WHERE store_id = ?
               AND (json_extract(payload, '$.email') = ?
                    OR json_extract(payload, '$.customer.email') = ?)
             ORDER BY received_at DESC
             LIMIT ?",
        )
        .bind(&store_id.0)
        .bind(email)
        .bind(email)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: SqliteRow) -> Result<Event, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = EventKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown event kind `{kind_raw}`")))?;

    let source_raw = row.try_get::<String, _>("source")?;
    let source = EventSource::parse(&source_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown event source `{source_raw}`")))?;

    Ok(Event {
        id: row.try_get("id")?,
        store_id: StoreId(row.try_get("store_id")?),
        external_event_id: row.try_get("external_event_id")?,
        kind,
        source,
        payload: parse_json("payload", row.try_get("payload")?)?,
        received_at: parse_timestamp("received_at", row.try_get("received_at")?)?,
        processed_at: parse_optional_timestamp("processed_at", row.try_get("processed_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use relay_core::domain::event::{Event, EventKind, EventSource, StoreId};

    use super::SqlEventRepository;
    use crate::migrations;
    use crate::repositories::EventRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn save_is_idempotent_on_event_id() {
        let pool = setup_pool().await;
        let store_id = store_fixture(&pool, "s-ev-1").await;
        let repo = SqlEventRepository::new(pool.clone());

        let event = sample_event(&store_id, "e-1", json!({"email": "a@example.com"}));
        repo.save(event.clone()).await.expect("first save");
        repo.save(event.clone()).await.expect("second save is a no-op");

        let found = repo.find_by_id("e-1").await.expect("find").expect("exists");
        assert_eq!(found.id, "e-1");
        assert_eq!(found.kind, EventKind::OrderCreated);

        pool.close().await;
    }

    #[tokio::test]
    async fn mark_processed_stamps_the_event() {
        let pool = setup_pool().await;
        let store_id = store_fixture(&pool, "s-ev-2").await;
        let repo = SqlEventRepository::new(pool.clone());

        let event = sample_event(&store_id, "e-2", json!({}));
        repo.save(event).await.expect("save");

        let processed_at = Utc::now();
        repo.mark_processed("e-2", processed_at).await.expect("mark processed");

        let found = repo.find_by_id("e-2").await.expect("find").expect("exists");
        assert!(found.processed_at.is_some());

        pool.close().await;
    }

    #[tokio::test]
    async fn recent_for_customer_matches_nested_email_and_bounds_results() {
        let pool = setup_pool().await;
        let store_id = store_fixture(&pool, "s-ev-3").await;
        let repo = SqlEventRepository::new(pool.clone());

        let base = Utc::now();
        for index in 0..5 {
            let mut event = sample_event(
                &store_id,
                &format!("e-m-{index}"),
                json!({"customer": {"email": "match@example.com"}}),
            );
            event.received_at = base - Duration::minutes(index);
            repo.save(event).await.expect("save matching");
        }
        repo.save(sample_event(&store_id, "e-other", json!({"email": "other@example.com"})))
            .await
            .expect("save other");

        let recent = repo
            .recent_for_customer(&store_id, "match@example.com", 3)
            .await
            .expect("recent events");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, "e-m-0");

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

    fn sample_event(store_id: &StoreId, id: &str, payload: serde_json::Value) -> Event {
        Event {
            id: id.to_string(),
            store_id: store_id.clone(),
            external_event_id: None,
            kind: EventKind::OrderCreated,
            source: EventSource::Platform,
            payload,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}
