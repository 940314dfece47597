use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use relay_agents::{AgentRegistry, HttpCommerceClient};
use relay_core::config::{AppConfig, ConfigError, LoadOptions};
use relay_core::crypto::{CredentialCipher, CryptoError};
use relay_db::repositories::{
    SqlAgentConfigRepository, SqlCustomerRepository, SqlEventRepository, SqlMetricsRepository,
    SqlOrderRepository, SqlProcessedEventRepository, SqlRunRepository, SqlStoreRepository,
};
use relay_db::{connect_with_settings, migrations, DbPool};
use relay_engine::{
    AllowAllBilling, ContextBuilder, IdempotencyStore, Orchestrator,
};
use relay_llm::ReasoningClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub events: Arc<SqlEventRepository>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid encryption key: {0}")]
    Crypto(#[from] CryptoError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!("database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!("database migrations applied");

    let cipher = CredentialCipher::from_hex_key(&config.security.encryption_key)?;

    let llm = Arc::new(ReasoningClient::new(&config.llm));
    let commerce = Arc::new(HttpCommerceClient::new());
    let registry = Arc::new(AgentRegistry::with_default_agents(llm, commerce));

    let runs = Arc::new(SqlRunRepository::new(db_pool.clone()));
    let events = Arc::new(SqlEventRepository::new(db_pool.clone()));
    let idempotency = Arc::new(IdempotencyStore::new(Arc::new(SqlProcessedEventRepository::new(
        db_pool.clone(),
    ))));

    let context_builder = ContextBuilder::new(
        Arc::new(SqlStoreRepository::new(db_pool.clone())),
        Arc::new(SqlCustomerRepository::new(db_pool.clone())),
        Arc::new(SqlOrderRepository::new(db_pool.clone())),
        Arc::clone(&events) as _,
        Arc::new(SqlAgentConfigRepository::new(db_pool.clone())),
        cipher,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        context_builder,
        runs,
        Arc::clone(&events) as _,
        idempotency,
        Arc::new(AllowAllBilling),
        Arc::new(SqlMetricsRepository::new(db_pool.clone())),
    ));

    info!(agents = 3, "agent registry initialized");

    Ok(Application { config, db_pool, orchestrator, events })
}
