use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::blocks::MessageTemplate;
use crate::commands::ProgressSink;
use crate::events::{
    default_dispatcher, ChatEnvelope, ChatEvent, EventContext, EventDispatcher, HandlerResult,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport reply failed: {0}")]
    Reply(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    /// The platform ended the session or asked for a new one.
    #[error("gateway session closed: {0}")]
    Closed(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("chat gateway gave up after {attempts} consecutive failed attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Connection to the chat platform's event gateway.
///
/// `next_envelope` returns `Ok(None)` when the transport has nothing more to
/// deliver, which ends the runner. A session dropped by the platform is
/// reported as [`TransportError::Closed`] and reconnected without spending the
/// retry budget.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn reply(&self, channel_id: &str, message: &MessageTemplate)
        -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(None)
    }

    async fn reply(
        &self,
        _channel_id: &str,
        _message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Posts progress messages to the channel a command came from.
struct ChannelProgress {
    transport: Arc<dyn GatewayTransport>,
    channel_id: String,
    correlation_id: String,
}

#[async_trait]
impl ProgressSink for ChannelProgress {
    async fn notify(&self, message: MessageTemplate) {
        if let Err(error) = self.transport.reply(&self.channel_id, &message).await {
            warn!(
                event_name = "egress.chat.progress_failed",
                correlation_id = %self.correlation_id,
                channel_id = %self.channel_id,
                error = %error,
                "failed to send progress message"
            );
        }
    }
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl Default for GatewayRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopGatewayTransport),
            dispatcher: default_dispatcher(),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Runs sessions until the transport finishes. Closed sessions are
    /// reopened; other failures back off and give up after `max_retries`
    /// consecutive attempts.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let mut failures: u32 = 0;

        loop {
            match self.connect_and_pump(failures).await {
                Ok(()) => return Ok(()),
                Err(TransportError::Closed(reason)) => {
                    info!(
                        event_name = "chat.gateway.session_closed",
                        reason = %reason,
                        "chat gateway session closed; reconnecting"
                    );
                    failures = 0;
                    self.pause(self.reconnect_policy.backoff(0)).await;
                }
                Err(transport_error) => {
                    warn!(
                        attempt = failures,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "chat gateway transport failed"
                    );

                    if failures >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "chat gateway retries exhausted"
                        );
                        return Err(GatewayError::RetriesExhausted {
                            attempts: failures + 1,
                            source: transport_error,
                        });
                    }

                    self.pause(self.reconnect_policy.backoff(failures)).await;
                    failures += 1;
                }
            }
        }
    }

    /// Closes the current gateway session.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.transport.disconnect().await
    }

    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening chat gateway connection");
        self.transport.connect().await?;
        info!(attempt, "chat gateway connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "chat gateway transport finished");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (channel_id, author_id) = correlation_fields(&envelope);

            debug!(
                event_name = "ingress.chat.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or("unknown"),
                author_id = author_id.unwrap_or("unknown"),
                "received chat envelope"
            );

            let mut context = EventContext::new(envelope.envelope_id.clone());
            if let Some(channel_id) = channel_id {
                context = context.with_progress(Arc::new(ChannelProgress {
                    transport: self.transport.clone(),
                    channel_id: channel_id.to_owned(),
                    correlation_id: envelope.envelope_id.clone(),
                }));
            }

            let outcome = match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        channel_id = channel_id.unwrap_or("unknown"),
                        error = %error,
                        "event dispatch failed; continuing gateway loop"
                    );
                    continue;
                }
            };

            let (HandlerResult::Responded(message), Some(channel_id)) = (outcome, channel_id)
            else {
                continue;
            };

            if let Err(error) = self.transport.reply(channel_id, &message).await {
                warn!(
                    event_name = "egress.chat.reply_failed",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    channel_id,
                    error = %error,
                    "failed to send chat reply"
                );
            } else {
                debug!(
                    event_name = "egress.chat.reply_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    channel_id,
                    embeds = message.embeds.len(),
                    "sent chat reply"
                );
            }
        }
    }
}

fn correlation_fields(envelope: &ChatEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        ChatEvent::MessageCreate(payload) => {
            (Some(payload.channel_id.as_str()), Some(payload.author_id.as_str()))
        }
        ChatEvent::Ready(_) | ChatEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::{GatewayError, GatewayRunner, GatewayTransport, ReconnectPolicy, TransportError};
    use crate::blocks::MessageTemplate;
    use crate::commands::{Member, MessagePayload};
    use crate::events::{ChatEnvelope, ChatEvent, EventDispatcher, StatsCommandHandler};
    use crate::lookup::StatsLookupService;
    use async_trait::async_trait;
    use charstats_core::StaticDocument;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<ChatEnvelope>, TransportError>>,
        disconnect_results: VecDeque<Result<(), TransportError>>,
        connect_attempts: usize,
        replies: Vec<(String, MessageTemplate)>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<ChatEnvelope>, TransportError>>,
            disconnect_results: Vec<Result<(), TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    disconnect_results: disconnect_results.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn replies(&self) -> Vec<(String, MessageTemplate)> {
            self.state.lock().await.replies.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn reply(
            &self,
            channel_id: &str,
            message: &MessageTemplate,
        ) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.replies.push((channel_id.to_owned(), message.clone()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            state.disconnect_results.pop_front().unwrap_or(Ok(()))
        }
    }

    fn command(envelope_id: &str, content: &str) -> ChatEnvelope {
        ChatEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: ChatEvent::MessageCreate(MessagePayload {
                message_id: format!("m-{envelope_id}"),
                channel_id: "C7".to_owned(),
                author_id: "U1".to_owned(),
                content: content.to_owned(),
                mentions: vec![Member {
                    id: "111".to_owned(),
                    name: "alice".to_owned(),
                    discriminator: "0001".to_owned(),
                    avatar_url: None,
                }],
            }),
        }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(ChatEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: ChatEvent::Unsupported { event_type: "TYPING_START".to_owned() },
                })),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.disconnect_calls().await, 1);
        assert!(transport.replies().await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_return_gateway_error() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            vec![],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        let error = runner.start().await.expect_err("retries should run out");
        let GatewayError::RetriesExhausted { attempts, source } = error;
        assert_eq!(attempts, 3);
        assert_eq!(source, TransportError::Connect("fail-3".to_owned()));
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn closed_sessions_reconnect_without_spending_retries() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(()), Ok(())],
            vec![
                Err(TransportError::Closed("server requested reconnect".to_owned())),
                Err(TransportError::Closed("socket closed".to_owned())),
                Ok(Some(command("env-3", "!charstats help"))),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(StatsCommandHandler::new(
            StatsLookupService::new(Arc::new(StaticDocument::unavailable())),
            "!",
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            dispatcher,
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        );
        runner.start().await.expect("closed sessions are not failures");

        assert_eq!(transport.connect_attempts().await, 3);
        assert_eq!(transport.replies().await.len(), 1);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn shutdown_disconnects_transport() {
        let transport = Arc::new(ScriptedTransport::default());
        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy::default(),
        );

        runner.shutdown().await.expect("shutdown");
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn posts_command_replies_to_originating_channel() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(command("env-1", "!charstats <@111>"))),
                Ok(Some(command("env-2", "just chatting"))),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(StatsCommandHandler::new(
            StatsLookupService::new(Arc::new(StaticDocument::new(
                "Player: @alice#0001\nCharacter Name: Zara\nHP: 10",
            ))),
            "!",
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            dispatcher,
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        );
        runner.start().await.expect("runner");

        let replies = transport.replies().await;
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|(channel_id, _)| channel_id == "C7"));
        assert_eq!(replies[0].1.content, "Fetching stats for @alice#0001 from Google Docs...");
        assert_eq!(replies[1].1.embeds[0].title, "Character Stats for Zara");
    }

    #[test]
    fn extracts_channel_and_author_correlation_fields() {
        let envelope = command("env-2", "!charstats <@111>");
        let (channel_id, author_id) = super::correlation_fields(&envelope);
        assert_eq!(channel_id, Some("C7"));
        assert_eq!(author_id, Some("U1"));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectPolicy { max_retries: 5, base_delay_ms: 100, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(2).as_millis(), 400);
        assert_eq!(policy.backoff(8).as_millis(), 1_000);
    }
}
