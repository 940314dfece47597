use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::agent::{AgentConfig, AgentKind};
use relay_core::domain::event::StoreId;

use super::{AgentConfigRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAgentConfigRepository {
    pool: DbPool,
}

impl SqlAgentConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentConfigRepository for SqlAgentConfigRepository {
    async fn list_for_store(
        &self,
        store_id: &StoreId,
    ) -> Result<Vec<AgentConfig>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT store_id, agent, enabled, max_actions_per_hour, model, max_cost_per_day_usd
             FROM agent_configs
             WHERE store_id = ?
             ORDER BY agent ASC",
        )
        .bind(&store_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(config_from_row).collect()
    }

    async fn save(&self, config: AgentConfig) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agent_configs (
                store_id, agent, enabled, max_actions_per_hour, model, max_cost_per_day_usd
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(store_id, agent) DO UPDATE SET
                enabled = excluded.enabled,
                max_actions_per_hour = excluded.max_actions_per_hour,
                model = excluded.model,
                max_cost_per_day_usd = excluded.max_cost_per_day_usd",
        )
        .bind(&config.store_id.0)
        .bind(config.agent.as_str())
        .bind(i64::from(config.enabled))
        .bind(i64::from(config.max_actions_per_hour))
        .bind(&config.model)
        .bind(config.max_cost_per_day_usd)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn config_from_row(row: SqliteRow) -> Result<AgentConfig, RepositoryError> {
    let agent_raw = row.try_get::<String, _>("agent")?;
    let agent = AgentKind::parse(&agent_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown agent kind `{agent_raw}`")))?;

    let max_actions = row.try_get::<i64, _>("max_actions_per_hour")?;
    let max_actions_per_hour = u32::try_from(max_actions).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `max_actions_per_hour`: {max_actions}"))
    })?;

    Ok(AgentConfig {
        store_id: StoreId(row.try_get("store_id")?),
        agent,
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        max_actions_per_hour,
        model: row.try_get("model")?,
        max_cost_per_day_usd: row.try_get("max_cost_per_day_usd")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use relay_core::domain::agent::{AgentConfig, AgentKind};
    use relay_core::domain::event::StoreId;

    use super::SqlAgentConfigRepository;
    use crate::migrations;
    use crate::repositories::AgentConfigRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn upserts_and_lists_store_configs() {
        let pool = setup_pool().await;
        let store_id = store_fixture(&pool, "s-cfg-1").await;
        let repo = SqlAgentConfigRepository::new(pool.clone());

        let mut config = AgentConfig::default_for(&store_id, AgentKind::Retention);
        config.max_cost_per_day_usd = 2.5;
        repo.save(config.clone()).await.expect("save");

        config.enabled = false;
        repo.save(config.clone()).await.expect("upsert");

        let configs = repo.list_for_store(&store_id).await.expect("list");
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].agent, AgentKind::Retention);
        assert!(!configs[0].enabled);
        assert_eq!(configs[0].max_cost_per_day_usd, 2.5);

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
