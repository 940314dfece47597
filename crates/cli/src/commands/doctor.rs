use serde::Serialize;

use relay_core::config::{AppConfig, LoadOptions};
use relay_core::crypto::CredentialCipher;
use relay_db::connect_with_settings;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    status: &'static str,
    checks: Vec<DoctorCheck>,
}

pub fn run(json: bool) -> String {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "ok",
                detail: "configuration loaded and validated".to_string(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "error",
                detail: format!("configuration issue: {error}"),
            });
            None
        }
    };

    if let Some(config) = &config {
        match CredentialCipher::from_hex_key(&config.security.encryption_key) {
            Ok(_) => checks.push(DoctorCheck {
                name: "encryption_key",
                status: "ok",
                detail: "credential cipher initialized".to_string(),
            }),
            Err(error) => checks.push(DoctorCheck {
                name: "encryption_key",
                status: "error",
                detail: format!("{error}"),
            }),
        }

        let has_provider_key =
            config.llm.openai_api_key.is_some() || config.llm.anthropic_api_key.is_some();
        checks.push(DoctorCheck {
            name: "reasoning_providers",
            status: if has_provider_key { "ok" } else { "warn" },
            detail: if has_provider_key {
                "at least one provider key configured".to_string()
            } else {
                "no provider keys configured; reasoning-backed decisions will fail".to_string()
            },
        });

        let database_check = check_database(config);
        checks.push(database_check);
    }

    let status =
        if checks.iter().any(|check| check.status == "error") { "error" } else { "ok" };
    let report = DoctorReport { status, checks };

    if json {
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
    } else {
        render_text(&report)
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database",
                status: "error",
                detail: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let outcome = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await?;
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await?;
        pool.close().await;
        Ok::<(), sqlx::Error>(())
    });

    match outcome {
        Ok(()) => DoctorCheck {
            name: "database",
            status: "ok",
            detail: "connection and probe query succeeded".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "database",
            status: "error",
            detail: format!("database check failed: {error}"),
        },
    }
}

fn render_text(report: &DoctorReport) -> String {
    let mut lines = vec![format!("doctor: {}", report.status)];
    for check in &report.checks {
        lines.push(format!("  [{}] {} - {}", check.status, check.name, check.detail));
    }
    lines.join("\n")
}
