use leadline_core::config::{AppConfig, ConfigError, LoadOptions};
use leadline_core::errors::ApplicationError;
use leadline_db::{connect_from_config, migrations, DbPool};
use leadline_engine::Engine;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Engine,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("engine setup failed: {0}")]
    Engine(#[source] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let engine = Engine::from_config(db_pool.clone(), &config).map_err(BootstrapError::Engine)?;
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        provider = engine.dispatcher.provider_name(),
        "engines initialized"
    );

    Ok(Application { config, db_pool, engine })
}

#[cfg(test)]
mod tests {
    use leadline_core::config::{ConfigOverrides, LoadOptions, MessagingProvider};

    use crate::bootstrap::{bootstrap, BootstrapError};

    fn in_memory() -> ConfigOverrides {
        ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_engines() {
        let app = bootstrap(LoadOptions { overrides: in_memory(), ..LoadOptions::default() })
            .await
            .expect("bootstrap should succeed with in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('lead', 'sla_state', 'outbound_message', 'lead_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected core tables after bootstrap");
        assert_eq!(table_count, 4);
        assert_eq!(app.engine.dispatcher.provider_name(), "noop");
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_incomplete_messaging_config() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                messaging_provider: Some(MessagingProvider::Webhook),
                ..in_memory()
            },
            ..LoadOptions::default()
        })
        .await;

        let error = result.err().expect("webhook without url must fail");
        assert!(matches!(error, BootstrapError::Config(_) | BootstrapError::Engine(_)));
        assert!(error.to_string().contains("webhook_url"));
    }
}
