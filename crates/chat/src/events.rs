use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use charstats_core::DocumentSource;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    blocks::{self, MessageTemplate},
    commands::{
        normalize_stats_command, CommandParseError, CommandRouteError, CommandRouter,
        MessagePayload, NoProgress, NoopStatsCommandService, ProgressSink, StatsCommandService,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub envelope_id: String,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Ready(ReadyEvent),
    MessageCreate(MessagePayload),
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::Ready(_) => ChatEventType::Ready,
            Self::MessageCreate(_) => ChatEventType::MessageCreate,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    /// Channel a reply to this event should go to, if any.
    pub fn reply_channel(&self) -> Option<&str> {
        match self {
            Self::MessageCreate(payload) => Some(&payload.channel_id),
            Self::Ready(_) | Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    Ready,
    MessageCreate,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyEvent {
    pub bot_name: String,
    pub guild_count: usize,
}

/// Per-event state handed to handlers.
#[derive(Clone)]
pub struct EventContext {
    pub correlation_id: String,
    /// Where interim messages for the originating channel go.
    pub progress: Arc<dyn ProgressSink>,
}

impl EventContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), progress: Arc::new(NoProgress) }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new("unknown-correlation-id")
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ReadyHandler::default());
    dispatcher.register(StatsCommandHandler::new(NoopStatsCommandService, "!"));
    dispatcher
}

/// Answers `<prefix>charstats` messages; every other message is ignored.
pub struct StatsCommandHandler<S> {
    router: CommandRouter<S>,
    prefix: String,
}

impl<S> StatsCommandHandler<S>
where
    S: StatsCommandService,
{
    pub fn new(service: S, prefix: impl Into<String>) -> Self {
        Self { router: CommandRouter::new(service), prefix: prefix.into() }
    }
}

#[async_trait]
impl<S> EventHandler for StatsCommandHandler<S>
where
    S: StatsCommandService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::MessageCreate
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::MessageCreate(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let Ok(normalized) = normalize_stats_command(payload.clone(), &self.prefix) else {
            return Ok(HandlerResult::Ignored);
        };

        match self.router.route(normalized, ctx.progress.as_ref()).await {
            Ok(message) => Ok(HandlerResult::Responded(message)),
            Err(error) => {
                warn!(
                    event_name = "chat.command.failed",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %payload.channel_id,
                    error = %error,
                    "charstats command failed"
                );
                Ok(HandlerResult::Responded(blocks::error_message(
                    error.user_message(),
                    &ctx.correlation_id,
                )))
            }
        }
    }
}

/// Logs the gateway session and prepares the document source.
#[derive(Default)]
pub struct ReadyHandler {
    documents: Option<Arc<dyn DocumentSource>>,
}

impl ReadyHandler {
    pub fn new(documents: Arc<dyn DocumentSource>) -> Self {
        Self { documents: Some(documents) }
    }
}

#[async_trait]
impl EventHandler for ReadyHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Ready
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Ready(ready) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "chat.gateway.ready",
            correlation_id = %ctx.correlation_id,
            bot_name = %ready.bot_name,
            guild_count = ready.guild_count,
            "bot connected to chat gateway"
        );

        if let Some(documents) = &self.documents {
            if !documents.warm_up().await {
                warn!(
                    event_name = "chat.gateway.document_source_unready",
                    correlation_id = %ctx.correlation_id,
                    "document source failed to authenticate; lookups will retry on demand"
                );
            }
        }

        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use charstats_core::{DocumentSource, StaticDocument};

    use super::{
        default_dispatcher, ChatEnvelope, ChatEvent, EventContext, EventDispatcher,
        HandlerResult, ReadyEvent, ReadyHandler, StatsCommandHandler,
    };
    use crate::blocks::MessageTemplate;
    use crate::commands::{
        CommandEnvelope, CommandRouteError, Member, MessagePayload, ProgressSink,
        StatsCommandService,
    };
    use crate::lookup::StatsLookupService;

    fn message(content: &str, mentions: Vec<Member>) -> ChatEnvelope {
        ChatEnvelope {
            envelope_id: "env-1".to_owned(),
            event: ChatEvent::MessageCreate(MessagePayload {
                message_id: "m-1".to_owned(),
                channel_id: "C1".to_owned(),
                author_id: "U1".to_owned(),
                content: content.to_owned(),
                mentions,
            }),
        }
    }

    fn bob() -> Member {
        Member {
            id: "222".to_owned(),
            name: "bob".to_owned(),
            discriminator: "0002".to_owned(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn default_dispatcher_registers_ready_and_message_handlers() {
        let dispatcher = default_dispatcher();
        assert_eq!(dispatcher.handler_count(), 2);

        let result = dispatcher
            .dispatch(
                &ChatEnvelope {
                    envelope_id: "env-0".to_owned(),
                    event: ChatEvent::Unsupported { event_type: "TYPING_START".to_owned() },
                },
                &EventContext::default(),
            )
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn stats_command_replies_with_parsed_sheet() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(StatsCommandHandler::new(
            StatsLookupService::new(Arc::new(StaticDocument::new("Player: @bob#0002\nHP: 5"))),
            "!",
        ));

        let result = dispatcher
            .dispatch(&message("!charstats <@222>", vec![bob()]), &EventContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Responded(reply) = result else {
            panic!("expected a reply, got {result:?}");
        };
        assert_eq!(reply.embeds[0].title, "Character Stats for @bob#0002");
        assert_eq!(reply.embeds[0].fields[0].value, "5");
    }

    #[tokio::test]
    async fn stats_command_reports_progress_through_context() {
        #[derive(Default)]
        struct RecordingProgress {
            messages: Mutex<Vec<MessageTemplate>>,
        }

        #[async_trait]
        impl ProgressSink for RecordingProgress {
            async fn notify(&self, message: MessageTemplate) {
                self.messages.lock().expect("lock").push(message);
            }
        }

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(StatsCommandHandler::new(
            StatsLookupService::new(Arc::new(StaticDocument::new("Player: @bob#0002\nHP: 5"))),
            "!",
        ));
        let progress = Arc::new(RecordingProgress::default());
        let context = EventContext::new("env-3").with_progress(progress.clone());

        let result = dispatcher
            .dispatch(&message("!charstats <@222>", vec![bob()]), &context)
            .await
            .expect("dispatch");

        assert!(matches!(result, HandlerResult::Responded(_)));
        let messages = progress.messages.lock().expect("lock");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Fetching stats for @bob#0002 from Google Docs...");
        assert!(!format!("{context:?}").contains("progress"));
    }

    #[tokio::test]
    async fn ordinary_messages_are_ignored() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(StatsCommandHandler::new(
            StatsLookupService::new(Arc::new(StaticDocument::unavailable())),
            "!",
        ));

        let result = dispatcher
            .dispatch(&message("good game everyone", vec![]), &EventContext::default())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn service_failures_become_generic_error_reply() {
        struct FailingService;

        #[async_trait]
        impl StatsCommandService for FailingService {
            async fn character_stats(
                &self,
                _member: &Member,
                _envelope: &CommandEnvelope,
            ) -> Result<MessageTemplate, CommandRouteError> {
                Err(CommandRouteError::Service("token file /secret/sa.json missing".to_owned()))
            }
        }

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(StatsCommandHandler::new(FailingService, "!"));

        let result = dispatcher
            .dispatch(
                &message("!charstats <@222>", vec![bob()]),
                &EventContext::new("env-9"),
            )
            .await
            .expect("dispatch");

        let HandlerResult::Responded(reply) = result else {
            panic!("expected a reply, got {result:?}");
        };
        assert!(reply.content.contains("An unexpected error occurred"));
        assert!(!reply.content.contains("/secret/sa.json"));
        assert!(reply.embeds[0]
            .footer
            .as_ref()
            .is_some_and(|footer| footer.text.contains("env-9")));
    }

    #[tokio::test]
    async fn ready_handler_warms_document_source() {
        #[derive(Default)]
        struct WarmTracker {
            warmed: AtomicBool,
        }

        #[async_trait]
        impl DocumentSource for WarmTracker {
            async fn fetch_document_text(&self) -> Option<String> {
                None
            }

            async fn warm_up(&self) -> bool {
                self.warmed.store(true, Ordering::SeqCst);
                false
            }
        }

        let tracker = Arc::new(WarmTracker::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(ReadyHandler::new(tracker.clone()));

        let result = dispatcher
            .dispatch(
                &ChatEnvelope {
                    envelope_id: "env-ready".to_owned(),
                    event: ChatEvent::Ready(ReadyEvent {
                        bot_name: "charstats".to_owned(),
                        guild_count: 3,
                    }),
                },
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        assert!(tracker.warmed.load(Ordering::SeqCst));
    }
}
