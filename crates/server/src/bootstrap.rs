use std::{sync::Arc, time::Duration};

use collaborator_agent::capabilities::{standard_registry, CapabilitySettings};
use collaborator_agent::{CapabilityError, LlmClient, Manager, ManagerSettings, OpenAiClient};
use collaborator_core::config::{AppConfig, ConfigError};
use collaborator_db::repositories::{
    SqlActionItemRepository, SqlFeedbackRepository, SqlMessageRepository,
};
use collaborator_db::{
    connect_with_settings, migrations, ActionItemRepository, DbPool, FeedbackRepository,
    MessageRepository,
};
use collaborator_teams::events::{FeedbackHandler, MessageHandler};
use collaborator_teams::{ConversationClient, EventDispatcher, HttpConnectorClient, TransportError};
use thiserror::Error;
use tracing::info;

use crate::turn::{FeedbackRecorder, TurnService};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub dispatcher: Arc<EventDispatcher>,
    pub anonymous_connector: bool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("teams connector setup failed: {0}")]
    Connector(#[source] TransportError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
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

    let llm: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Llm(error.to_string()))?,
    );
    let connector = HttpConnectorClient::from_config(
        &config.teams,
        Duration::from_secs(config.llm.timeout_secs),
    )
    .map_err(BootstrapError::Connector)?;
    let anonymous_connector = connector.is_anonymous();

    let dispatcher = build_dispatcher(&config, &db_pool, llm, Arc::new(connector))?;
    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        dispatch = config.agent.dispatch.as_str(),
        "manager and capabilities initialized"
    );

    Ok(Application { config, db_pool, dispatcher: Arc::new(dispatcher), anonymous_connector })
}

/// Wires the SQL stores, capabilities and manager into a Teams event dispatcher.
pub fn build_dispatcher(
    config: &AppConfig,
    db_pool: &DbPool,
    llm: Arc<dyn LlmClient>,
    connector: Arc<dyn ConversationClient>,
) -> Result<EventDispatcher, BootstrapError> {
    let messages: Arc<dyn MessageRepository> = Arc::new(SqlMessageRepository::new(db_pool.clone()));
    let action_items: Arc<dyn ActionItemRepository> =
        Arc::new(SqlActionItemRepository::new(db_pool.clone()));
    let feedback: Arc<dyn FeedbackRepository> =
        Arc::new(SqlFeedbackRepository::new(db_pool.clone()));

    let registry = standard_registry(
        llm.clone(),
        messages.clone(),
        action_items,
        CapabilitySettings::from_config(&config.llm, &config.agent),
    )?;
    let manager = Manager::new(
        llm,
        messages.clone(),
        registry,
        ManagerSettings::from_config(&config.llm, &config.agent),
    );

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(
        TurnService::new(Arc::new(manager), messages, connector)
            .with_window_hours(config.agent.default_window_hours),
    ));
    dispatcher.register(FeedbackHandler::new(FeedbackRecorder::new(feedback)));
    Ok(dispatcher)
}
