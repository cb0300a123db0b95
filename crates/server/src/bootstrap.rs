use std::sync::Arc;

use charstats_chat::discord::{DiscordGatewayTransport, DiscordSettings};
use charstats_chat::events::{EventDispatcher, ReadyHandler, StatsCommandHandler};
use charstats_chat::gateway::{
    GatewayRunner, GatewayTransport, NoopGatewayTransport, ReconnectPolicy, TransportError,
};
use charstats_chat::lookup::StatsLookupService;
use charstats_core::config::{AppConfig, ChatConfig, ChatTransport, ConfigError, LoadOptions};
use charstats_core::DocumentSource;
use charstats_docs::GoogleDocsClient;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub docs_client: Arc<GoogleDocsClient>,
    pub gateway_runner: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        document_id = %config.document.document_id,
        transport = ?config.chat.transport,
        "starting application bootstrap"
    );

    let transport = gateway_transport(&config.chat)?;

    let docs_client = Arc::new(GoogleDocsClient::from_config(&config.document));
    let documents: Arc<dyn DocumentSource> = docs_client.clone();

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ReadyHandler::new(documents.clone()));
    dispatcher.register(StatsCommandHandler::new(
        StatsLookupService::new(documents).with_max_fields(config.display.max_fields),
        config.chat.command_prefix.clone(),
    ));

    info!(
        event_name = "system.bootstrap.dispatcher_ready",
        correlation_id = "bootstrap",
        handlers = dispatcher.handler_count(),
        command_prefix = %config.chat.command_prefix,
        max_fields = config.display.max_fields,
        "event handlers registered"
    );

    let gateway_runner = GatewayRunner::new(transport, dispatcher, ReconnectPolicy::default());

    Ok(Application { config, docs_client, gateway_runner })
}

/// Builds the gateway connection named by `chat.transport`.
fn gateway_transport(chat: &ChatConfig) -> Result<Arc<dyn GatewayTransport>, TransportError> {
    match chat.transport {
        ChatTransport::Discord => {
            let transport = DiscordGatewayTransport::new(DiscordSettings::from_config(chat))?;
            Ok(Arc::new(transport))
        }
        ChatTransport::Noop => Ok(Arc::new(NoopGatewayTransport)),
    }
}
