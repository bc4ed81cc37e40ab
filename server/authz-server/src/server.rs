use crate::config::ServerConfig;
use anyhow::{Context, Result};
use auth_grants::{repository::PostgresGrantStore, schema, GrantEngine};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How long startup waits for the first database round trip.
const STARTUP_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Main server state shared by every handler
#[derive(Clone)]
pub struct AuthzServer {
    /// Grant engine
    pub engine: Arc<GrantEngine>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl AuthzServer {
    /// The engine takes its per-operation deadline from `config`.
    pub fn new(engine: GrantEngine, config: ServerConfig) -> Self {
        Self {
            engine: Arc::new(engine.with_timeout(config.operation_timeout)),
            config: Arc::new(config),
        }
    }

    /// Connect to PostgreSQL, verify it answers, make sure the grants table
    /// exists and build the engine on top of it.
    pub async fn connect(database_url: &str, config: ServerConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(STARTUP_PING_TIMEOUT)
            .connect_lazy(database_url)
            .context("Invalid database connection string")?;

        let store = PostgresGrantStore::new(pool.clone());
        let engine = GrantEngine::new(Arc::new(store)).with_timeout(STARTUP_PING_TIMEOUT);
        engine
            .ping()
            .await
            .context("Database did not answer the startup ping")?;
        info!("Connected to database");

        schema::ensure_schema(&pool)
            .await
            .context("Failed to create grants schema")?;

        Ok(Self::new(engine, config))
    }
}
