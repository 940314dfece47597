use chrono::{Duration, Utc};

use relay_core::config::{AppConfig, LoadOptions};
use relay_core::limits::{AGENT_RUNS_RETENTION_DAYS, PROCESSED_EVENTS_RETENTION_DAYS};
use relay_db::repositories::{
    ProcessedEventRepository, RunRepository, SqlProcessedEventRepository, SqlRunRepository,
};
use relay_db::connect_with_settings;

use crate::commands::CommandResult;

/// Drop idempotency-ledger rows and run records that have aged out of
/// their retention windows.
pub fn run(retention_days_override: Option<u32>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "cleanup",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "cleanup",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let ledger_retention_days =
        retention_days_override.unwrap_or(PROCESSED_EVENTS_RETENTION_DAYS);

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let now = Utc::now();
        let ledger = SqlProcessedEventRepository::new(pool.clone());
        let ledger_removed = ledger
            .delete_older_than(now - Duration::days(i64::from(ledger_retention_days)))
            .await
            .map_err(|error| ("ledger_cleanup", error.to_string(), 5u8))?;

        let runs = SqlRunRepository::new(pool.clone());
        let runs_removed = runs
            .delete_older_than(now - Duration::days(i64::from(AGENT_RUNS_RETENTION_DAYS)))
            .await
            .map_err(|error| ("run_cleanup", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<(u64, u64), (&'static str, String, u8)>((ledger_removed, runs_removed))
    });

    match result {
        Ok((ledger_removed, runs_removed)) => CommandResult::success(
            "cleanup",
            format!(
                "removed {ledger_removed} processed-event rows (older than {ledger_retention_days}d) and {runs_removed} run records (older than {AGENT_RUNS_RETENTION_DAYS}d)"
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("cleanup", error_class, message, exit_code)
        }
    }
}
