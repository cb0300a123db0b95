use std::sync::Arc;

use async_trait::async_trait;
use charstats_core::config::DEFAULT_MAX_PANEL_FIELDS;
use charstats_core::{find_record, DocumentSource};
use tracing::info;

use crate::blocks::{self, MessageTemplate, StatsCard};
use crate::commands::{CommandEnvelope, CommandRouteError, Member, StatsCommandService};

/// Fetches the stats document on every command and renders the mentioned
/// member's sheet. Nothing is cached between commands.
pub struct StatsLookupService {
    documents: Arc<dyn DocumentSource>,
    max_fields: usize,
}

impl StatsLookupService {
    pub fn new(documents: Arc<dyn DocumentSource>) -> Self {
        Self { documents, max_fields: DEFAULT_MAX_PANEL_FIELDS }
    }

    pub fn with_max_fields(mut self, max_fields: usize) -> Self {
        self.max_fields = max_fields;
        self
    }
}

#[async_trait]
impl StatsCommandService for StatsLookupService {
    async fn character_stats(
        &self,
        member: &Member,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let identity = member.identity();

        let Some(document) = self.documents.fetch_document_text().await else {
            info!(
                event_name = "chat.lookup.document_unavailable",
                correlation_id = %envelope.request_id,
                channel_id = %envelope.channel_id,
                identity = %identity,
                "stats document unavailable"
            );
            return Ok(blocks::document_unavailable_message());
        };

        let record = find_record(&document, &identity);
        info!(
            event_name = "chat.lookup.completed",
            correlation_id = %envelope.request_id,
            channel_id = %envelope.channel_id,
            identity = %identity,
            found = record.is_some(),
            "stats lookup completed"
        );

        Ok(StatsCard::new(identity, record)
            .thumbnail(member.avatar_url.clone())
            .max_fields(self.max_fields)
            .render())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use charstats_core::StaticDocument;

    use super::StatsLookupService;
    use crate::commands::{CommandEnvelope, Member, StatsCommandService};

    const DOCUMENT: &str =
        "Player: @alice#0001\nCharacter Name: Zara\nHP: 10\nX_X_X\nPlayer: @bob#0002\nHP: 5";

    fn member(name: &str, discriminator: &str) -> Member {
        Member {
            id: "1".to_owned(),
            name: name.to_owned(),
            discriminator: discriminator.to_owned(),
            avatar_url: Some("https://cdn.example/a.png".to_owned()),
        }
    }

    fn envelope() -> CommandEnvelope {
        CommandEnvelope {
            prefix: "!".to_owned(),
            argument: Some("<@1>".to_owned()),
            mentions: Vec::new(),
            channel_id: "C1".to_owned(),
            author_id: "U1".to_owned(),
            request_id: "m-1".to_owned(),
        }
    }

    #[tokio::test]
    async fn renders_found_record_with_avatar() {
        let service = StatsLookupService::new(Arc::new(StaticDocument::new(DOCUMENT)));
        let message =
            service.character_stats(&member("alice", "0001"), &envelope()).await.expect("reply");

        let embed = &message.embeds[0];
        assert_eq!(embed.title, "Character Stats for Zara");
        assert_eq!(embed.fields.len(), 1);
        assert_eq!(embed.fields[0].name, "HP");
        assert_eq!(embed.fields[0].value, "10");
        assert!(embed.thumbnail.is_some());
    }

    #[tokio::test]
    async fn reports_missing_player() {
        let service = StatsLookupService::new(Arc::new(StaticDocument::new(DOCUMENT)));
        let message =
            service.character_stats(&member("carol", "0003"), &envelope()).await.expect("reply");

        assert!(message.embeds.is_empty());
        assert!(message.content.contains("Could not find character stats for @carol#0003"));
    }

    #[tokio::test]
    async fn reports_unreadable_document() {
        let service = StatsLookupService::new(Arc::new(StaticDocument::unavailable()));
        let message =
            service.character_stats(&member("alice", "0001"), &envelope()).await.expect("reply");

        assert!(message.content.starts_with("Error: Could not read the document."));
    }

    #[tokio::test]
    async fn applies_configured_field_limit() {
        let document = "Player: @alice#0001\nA: 1\nB: 2\nC: 3";
        let service =
            StatsLookupService::new(Arc::new(StaticDocument::new(document))).with_max_fields(2);
        let message =
            service.character_stats(&member("alice", "0001"), &envelope()).await.expect("reply");

        assert_eq!(message.embeds[0].fields.len(), 2);
        assert!(message.embeds[0].footer.is_some());
    }
}
