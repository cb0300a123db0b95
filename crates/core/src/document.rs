use async_trait::async_trait;

/// Source of the shared stats document.
///
/// Implementations log their own failures; callers only see whether text was
/// available.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Full plain-text contents of the document, or `None` when it could not be
    /// read or is empty.
    async fn fetch_document_text(&self) -> Option<String>;

    /// Prepares credentials and connections ahead of the first request.
    async fn warm_up(&self) -> bool {
        true
    }
}

/// A fixed in-memory document, used for offline lookups and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticDocument {
    text: Option<String>,
}

impl StaticDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()) }
    }

    pub fn unavailable() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl DocumentSource for StaticDocument {
    async fn fetch_document_text(&self) -> Option<String> {
        self.text.clone().filter(|text| !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentSource, StaticDocument};

    #[tokio::test]
    async fn static_document_collapses_empty_text_to_none() {
        assert_eq!(StaticDocument::new("").fetch_document_text().await, None);
        assert_eq!(StaticDocument::unavailable().fetch_document_text().await, None);
        assert_eq!(
            StaticDocument::new("Player: @a").fetch_document_text().await.as_deref(),
            Some("Player: @a")
        );
    }
}
