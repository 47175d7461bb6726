use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tracing::info;

use poapbot_core::config::{AppConfig, ConfigError, LoadOptions};
use poapbot_db::repositories::{
    DeliveryLog, RuleRepository, SqlDeliveryLog, SqlReactionLedger, SqlRuleRepository,
};
use poapbot_db::{connect, migrations, DbPool};
use poapbot_engine::DeliveryEvaluator;
use poapbot_notify::{HttpEmailNotifier, TemplateError};
use poapbot_poap::PoapClient;
use poapbot_slack::gateway::{ChatGateway, HttpChatGateway};

/// Shared state handed to the webhook and admin routers.
#[derive(Clone)]
pub struct AppState {
    pub signing_secret: SecretString,
    pub rules: Arc<dyn RuleRepository>,
    pub deliveries: Arc<dyn DeliveryLog>,
    pub chat: Arc<dyn ChatGateway>,
    pub evaluator: Arc<DeliveryEvaluator>,
}

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    EmailTemplate(#[from] TemplateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let rules: Arc<dyn RuleRepository> = Arc::new(SqlRuleRepository::new(db_pool.clone()));
    let ledger = Arc::new(SqlReactionLedger::new(db_pool.clone()));
    let deliveries: Arc<dyn DeliveryLog> = Arc::new(SqlDeliveryLog::new(db_pool.clone()));
    let chat: Arc<dyn ChatGateway> =
        Arc::new(HttpChatGateway::new(config.slack.bot_token.clone()));
    let issuer = Arc::new(PoapClient::new(config.poap.clone()));
    let notifier = Arc::new(HttpEmailNotifier::new(config.email.clone())?);

    info!(
        event_name = "system.bootstrap.delivery_mode",
        poap_mode = if config.poap.api_key.is_some() { "live" } else { "mock" },
        email_mode = if config.email.is_configured() { "live" } else { "mock" },
        "outbound delivery transports initialized"
    );

    let evaluator = Arc::new(DeliveryEvaluator::new(
        rules.clone(),
        ledger,
        deliveries.clone(),
        chat.clone(),
        issuer,
        notifier,
    ));

    let state = AppState {
        signing_secret: config.slack.signing_secret.clone(),
        rules,
        deliveries,
        chat,
        evaluator,
    };

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use poapbot_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                slack_signing_secret: Some("test-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_slack_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_assembles_state() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' \
             AND name IN ('poap_rule', 'reaction_snapshot', 'poap_delivery')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 3);

        let rules = app.state.rules.list_active().await.expect("list");
        assert!(rules.is_empty());

        app.db_pool.close().await;
    }
}
