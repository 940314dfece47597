use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::agent::{AgentKind, Run, RunStatus};
use relay_core::domain::event::StoreId;

use super::{parse_timestamp, RepositoryError, RunRepository};
use crate::DbPool;

pub struct SqlRunRepository {
    pool: DbPool,
}

impl SqlRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RunRepository for SqlRunRepository {
    async fn create(&self, run: Run) -> Result<(), RepositoryError> {
        let decision_json = run
            .decision
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("decision encode: {error}")))?;
        let result_json = run
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("result encode: {error}")))?;

        sqlx::query(
            "INSERT INTO agent_runs (
                id,
                store_id,
                agent,
                trigger_event_id,
                decision,
                result,
                duration_ms,
                tokens_used,
                cost_usd,
                status,
                error_message,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(&run.store_id.0)
        .bind(run.agent.as_str())
        .bind(&run.trigger_event_id)
        .bind(decision_json.as_deref())
        .bind(result_json.as_deref())
        .bind(run.duration_ms)
        .bind(i64::from(run.tokens_used))
        .bind(run.cost_usd)
        .bind(run.status.as_str())
        .bind(run.error_message.as_deref())
        .bind(run.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                store_id,
                agent,
                trigger_event_id,
                decision,
                result,
                duration_ms,
                tokens_used,
                cost_usd,
                status,
                error_message,
                created_at
             FROM agent_runs
             WHERE trigger_event_id = ?
             ORDER BY created_at ASC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(run_from_row).collect()
    }

    async fn cost_since(
        &self,
        store_id: &StoreId,
        agent: Option<AgentKind>,
        since: DateTime<Utc>,
    ) -> Result<f64, RepositoryError> {
        let total = if let Some(agent) = agent {
            sqlx::query(
                "SELECT COALESCE(SUM(cost_usd), 0.0) AS total_cost
                 FROM agent_runs
                 WHERE store_id = ? AND agent = ? AND created_at >= ?",
            )
            .bind(&store_id.0)
            .bind(agent.as_str())
            .bind(since.to_rfc3339())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT COALESCE(SUM(cost_usd), 0.0) AS total_cost
                 FROM agent_runs
                 WHERE store_id = ? AND created_at >= ?",
            )
            .bind(&store_id.0)
            .bind(since.to_rfc3339())
            .fetch_one(&self.pool)
            .await?
        };

        Ok(total.try_get::<f64, _>("total_cost")?)
    }

    async fn actions_since(
        &self,
        store_id: &StoreId,
        agent: AgentKind,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS action_count
             FROM agent_runs
             WHERE store_id = ?
               AND agent = ?
               AND created_at >= ?
               AND decision IS NOT NULL
               AND json_extract(decision, '$.action') != 'NO_ACTION'",
        )
        .bind(&store_id.0)
        .bind(agent.as_str())
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("action_count")?)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM agent_runs WHERE created_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn run_from_row(row: SqliteRow) -> Result<Run, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RunStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown run status `{status_raw}`")))?;

    let agent_raw = row.try_get::<String, _>("agent")?;
    let agent = AgentKind::parse(&agent_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown agent kind `{agent_raw}`")))?;

    let decision = row
        .try_get::<Option<String>, _>("decision")?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|error| RepositoryError::Decode(format!("decision decode: {error}")))
        })
        .transpose()?;

    let result = row
        .try_get::<Option<String>, _>("result")?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|error| RepositoryError::Decode(format!("result decode: {error}")))
        })
        .transpose()?;

    let tokens_used = row.try_get::<i64, _>("tokens_used")?;
    let tokens_used = u32::try_from(tokens_used).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `tokens_used`: {tokens_used}"))
    })?;

    Ok(Run {
        id: row.try_get("id")?,
        store_id: StoreId(row.try_get("store_id")?),
        agent,
        trigger_event_id: row.try_get("trigger_event_id")?,
        decision,
        result,
        duration_ms: row.try_get("duration_ms")?,
        tokens_used,
        cost_usd: row.try_get("cost_usd")?,
        status,
        error_message: row.try_get("error_message")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
