use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{self, MessageTemplate};

pub const COMMAND_NAME: &str = "charstats";

/// A guild member as the chat platform reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub discriminator: String,
    pub avatar_url: Option<String>,
}

impl Member {
    /// The tag players write after `Player:` in the stats document.
    pub fn identity(&self) -> String {
        format!("@{}#{}", self.name, self.discriminator)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePayload {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub mentions: Vec<Member>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub prefix: String,
    pub argument: Option<String>,
    pub mentions: Vec<Member>,
    pub channel_id: String,
    pub author_id: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatsCommand {
    Lookup { member: Member },
    MissingTarget,
    UnknownMember { argument: String },
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("message is not a `{0}` command")]
    NotACommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

impl CommandRouteError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Service(_) => "An unexpected error occurred. Please check the bot logs.",
        }
    }
}

/// Recognizes `<prefix>charstats [argument]` and captures its first argument.
pub fn normalize_stats_command(
    payload: MessagePayload,
    prefix: &str,
) -> Result<CommandEnvelope, CommandParseError> {
    let content = payload.content.trim();
    let mut parts = content.split_whitespace();
    let head = parts.next().unwrap_or_default();

    let is_command = head
        .strip_prefix(prefix)
        .is_some_and(|name| name.eq_ignore_ascii_case(COMMAND_NAME));
    if !is_command {
        return Err(CommandParseError::NotACommand(format!("{prefix}{COMMAND_NAME}")));
    }

    Ok(CommandEnvelope {
        prefix: prefix.to_owned(),
        argument: parts.next().map(str::to_owned),
        mentions: payload.mentions,
        channel_id: payload.channel_id,
        author_id: payload.author_id,
        request_id: payload.message_id,
    })
}

pub fn classify_stats_command(envelope: &CommandEnvelope) -> StatsCommand {
    let Some(argument) = envelope.argument.as_deref() else {
        return StatsCommand::MissingTarget;
    };

    if argument.eq_ignore_ascii_case("help") {
        return StatsCommand::Help;
    }

    match resolve_member(argument, &envelope.mentions) {
        Some(member) => StatsCommand::Lookup { member },
        None => StatsCommand::UnknownMember { argument: argument.to_owned() },
    }
}

/// Resolves `<@id>`, `<@!id>`, a bare user id, or an exact username against
/// the members mentioned in the message.
pub fn resolve_member(argument: &str, mentions: &[Member]) -> Option<Member> {
    let id = argument
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|rest| rest.trim_start_matches('!'))
        .unwrap_or(argument);

    if id.is_empty() {
        return None;
    }

    mentions
        .iter()
        .find(|member| member.id == id)
        .or_else(|| mentions.iter().find(|member| member.name == argument))
        .cloned()
}

/// Receives interim messages posted while a command is still running.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn notify(&self, message: MessageTemplate);
}

/// Drops progress messages.
#[derive(Default)]
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn notify(&self, _message: MessageTemplate) {}
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: StatsCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        envelope: CommandEnvelope,
        progress: &dyn ProgressSink,
    ) -> Result<MessageTemplate, CommandRouteError> {
        match classify_stats_command(&envelope) {
            StatsCommand::Lookup { member } => {
                progress.notify(blocks::progress_message(&member.identity())).await;
                self.service.character_stats(&member, &envelope).await
            }
            StatsCommand::MissingTarget => Ok(blocks::usage_message(&envelope.prefix)),
            StatsCommand::UnknownMember { argument } => {
                Ok(blocks::unknown_member_message(&argument))
            }
            StatsCommand::Help => Ok(blocks::help_message(&envelope.prefix)),
        }
    }
}

#[async_trait]
pub trait StatsCommandService: Send + Sync {
    async fn character_stats(
        &self,
        member: &Member,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;
}

#[derive(Default)]
pub struct NoopStatsCommandService;

#[async_trait]
impl StatsCommandService for NoopStatsCommandService {
    async fn character_stats(
        &self,
        member: &Member,
        _envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        Ok(blocks::StatsCard::new(member.identity(), None).render())
    }
}
