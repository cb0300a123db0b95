use charstats_core::config::DEFAULT_MAX_PANEL_FIELDS;
use charstats_core::{StatRecord, CHARACTER_NAME_KEY, PLAYER_KEY};
use serde::Serialize;

pub const STATS_PANEL_COLOR: u32 = 0x3498db;
pub const WARNING_PANEL_COLOR: u32 = 0xe67e22;

/// Stand-in for empty names and values, which the platform rejects.
const BLANK_FIELD_TEXT: &str = "\u{200b}";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl MessageTemplate {
    pub fn plain(content: impl Into<String>) -> Self {
        Self { content: content.into(), embeds: Vec::new() }
    }
}

pub struct MessageBuilder {
    content: String,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), embeds: Vec::new() }
    }

    pub fn embed<F>(mut self, title: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut EmbedBuilder),
    {
        let mut builder = EmbedBuilder::new(title.into());
        build(&mut builder);
        self.embeds.push(builder.build());
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { content: self.content, embeds: self.embeds }
    }
}

pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    fn new(title: String) -> Self {
        Self {
            embed: Embed {
                title,
                description: None,
                color: STATS_PANEL_COLOR,
                thumbnail: None,
                fields: Vec::new(),
                footer: None,
            },
        }
    }

    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.embed.description = Some(text.into());
        self
    }

    pub fn color(&mut self, color: u32) -> &mut Self {
        self.embed.color = color;
        self
    }

    pub fn thumbnail(&mut self, url: impl Into<String>) -> &mut Self {
        self.embed.thumbnail = Some(EmbedThumbnail { url: url.into() });
        self
    }

    pub fn field(&mut self, name: &str, value: &str, inline: bool) -> &mut Self {
        self.embed.fields.push(EmbedField {
            name: non_blank(name),
            value: non_blank(value),
            inline,
        });
        self
    }

    pub fn footer(&mut self, text: impl Into<String>) -> &mut Self {
        self.embed.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    fn build(self) -> Embed {
        self.embed
    }
}

fn non_blank(text: &str) -> String {
    if text.is_empty() {
        BLANK_FIELD_TEXT.to_owned()
    } else {
        text.to_owned()
    }
}

/// Renders a player's parsed stat sheet, or the not-found reply.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsCard {
    identity: String,
    record: Option<StatRecord>,
    thumbnail_url: Option<String>,
    max_fields: usize,
}

impl StatsCard {
    pub fn new(identity: impl Into<String>, record: Option<StatRecord>) -> Self {
        Self {
            identity: identity.into(),
            record,
            thumbnail_url: None,
            max_fields: DEFAULT_MAX_PANEL_FIELDS,
        }
    }

    pub fn thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail_url = url;
        self
    }

    pub fn max_fields(mut self, max_fields: usize) -> Self {
        self.max_fields = max_fields;
        self
    }

    pub fn render(&self) -> MessageTemplate {
        let Some(record) = &self.record else {
            return MessageTemplate::plain(format!(
                "Could not find character stats for {} in the document. Ensure the player tag (e.g., Player: @Username#1234) and format are correct in the document.",
                self.identity
            ));
        };

        let character_name = record.character_name();
        let title = format!("Character Stats for {}", character_name.unwrap_or(&self.identity));

        let displayable = record.iter().filter(|(key, _)| is_displayable(key)).collect::<Vec<_>>();
        let truncated = displayable.len() > self.max_fields;

        MessageBuilder::new(String::new())
            .embed(title, |embed| {
                match character_name {
                    Some(name) => embed.description(format!("**Character:** {name}")),
                    None => embed.description("Character name not found in stats."),
                };
                if let Some(url) = &self.thumbnail_url {
                    embed.thumbnail(url.clone());
                }
                for (key, value) in displayable.iter().take(self.max_fields) {
                    embed.field(key, value, true);
                }
                if truncated {
                    embed.footer(format!(
                        "Note: Some stats were truncated as they exceed the display limit ({} fields).",
                        self.max_fields
                    ));
                }
            })
            .build()
    }
}

fn is_displayable(key: &str) -> bool {
    !key.eq_ignore_ascii_case(PLAYER_KEY) && !key.eq_ignore_ascii_case(CHARACTER_NAME_KEY)
}

pub fn usage_message(prefix: &str) -> MessageTemplate {
    MessageTemplate::plain(format!(
        "You need to mention a user! Usage: `{prefix}charstats @Username`"
    ))
}

/// Sent before the document is fetched so the channel sees the lookup started.
pub fn progress_message(identity: &str) -> MessageTemplate {
    MessageTemplate::plain(format!("Fetching stats for {identity} from Google Docs..."))
}

pub fn unknown_member_message(argument: &str) -> MessageTemplate {
    MessageTemplate::plain(format!(
        "Could not find the user: {argument}. Please make sure you've entered a valid @mention or UserID."
    ))
}

pub fn document_unavailable_message() -> MessageTemplate {
    MessageTemplate::plain(
        "Error: Could not read the document. Make sure it's shared correctly, the ID is valid, and the document is not empty.",
    )
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .embed("Something went wrong", |embed| {
            embed
                .color(WARNING_PANEL_COLOR)
                .description(format!(":warning: {summary}"))
                .footer(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message(prefix: &str) -> MessageTemplate {
    MessageBuilder::new("Character stats help")
        .embed("Available commands", |embed| {
            embed.description(format!(
                "• `{prefix}charstats @Username` - show the mentioned player's character sheet\n• `{prefix}charstats help` - show this message"
            ));
        })
        .build()
}
