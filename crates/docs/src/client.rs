use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use charstats_core::config::DocumentConfig;
use charstats_core::DocumentSource;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{DocsError, Result};
use crate::text::{DocsDocument, TEXT_FIELDS_MASK};
use crate::token::{ServiceAccountTokenSource, TokenSource};

#[derive(Clone, Debug)]
pub struct DocsSettings {
    pub document_id: String,
    pub credentials_path: PathBuf,
    pub api_base_url: String,
    pub timeout: Duration,
}

impl From<&DocumentConfig> for DocsSettings {
    fn from(config: &DocumentConfig) -> Self {
        Self {
            document_id: config.document_id.clone(),
            credentials_path: config.credentials_path.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

enum Session {
    Idle,
    Open(reqwest::Client),
    Closed,
}

/// Reads one Google Docs document as plain text.
///
/// The HTTP client is built on first use and shared by every later request;
/// [`GoogleDocsClient::shutdown`] releases it together with the cached token.
pub struct GoogleDocsClient {
    settings: DocsSettings,
    tokens: Arc<dyn TokenSource>,
    session: Mutex<Session>,
}

impl GoogleDocsClient {
    pub fn new(settings: DocsSettings) -> Self {
        let tokens = Arc::new(ServiceAccountTokenSource::new(settings.credentials_path.clone()));
        Self::with_token_source(settings, tokens)
    }

    pub fn from_config(config: &DocumentConfig) -> Self {
        Self::new(DocsSettings::from(config))
    }

    pub fn with_token_source(settings: DocsSettings, tokens: Arc<dyn TokenSource>) -> Self {
        Self { settings, tokens, session: Mutex::new(Session::Idle) }
    }

    pub fn settings(&self) -> &DocsSettings {
        &self.settings
    }

    pub fn credentials_readable(&self) -> bool {
        self.settings.credentials_path.is_file()
    }

    pub async fn is_open(&self) -> bool {
        matches!(*self.session.lock().await, Session::Open(_))
    }

    async fn http(&self) -> Result<reqwest::Client> {
        let mut session = self.session.lock().await;
        match &*session {
            Session::Open(client) => Ok(client.clone()),
            Session::Closed => Err(DocsError::ShutDown),
            Session::Idle => {
                let client = reqwest::Client::builder().timeout(self.settings.timeout).build()?;
                info!(
                    event_name = "docs.client.opened",
                    timeout_secs = self.settings.timeout.as_secs(),
                    "document http client initialized"
                );
                *session = Session::Open(client.clone());
                Ok(client)
            }
        }
    }

    /// Fetches the configured document and flattens it to plain text.
    pub async fn fetch_text(&self) -> Result<String> {
        let http = self.http().await?;
        let token = self.tokens.access_token(&http).await?;

        let url =
            format!("{}/v1/documents/{}", self.settings.api_base_url, self.settings.document_id);
        debug!(
            event_name = "docs.document.request",
            document_id = %self.settings.document_id,
            "requesting document"
        );

        let response =
            http.get(&url).bearer_auth(token).query(&[("fields", TEXT_FIELDS_MASK)]).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        if !status.is_success() {
            return Err(DocsError::DocumentStatus { status: status.as_u16() });
        }

        let document: DocsDocument = response.json().await?;
        Ok(document.plain_text())
    }

    /// Opens the HTTP client and obtains a token ahead of the first command.
    pub async fn connect(&self) -> Result<()> {
        let http = self.http().await?;
        self.tokens.access_token(&http).await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        *session = Session::Closed;
        self.tokens.invalidate().await;
        info!(event_name = "docs.client.closed", "document client shut down");
    }
}

#[async_trait]
impl DocumentSource for GoogleDocsClient {
    async fn fetch_document_text(&self) -> Option<String> {
        match self.fetch_text().await {
            Ok(text) if text.is_empty() => {
                warn!(
                    event_name = "docs.document.empty",
                    document_id = %self.settings.document_id,
                    "document has no text content"
                );
                None
            }
            Ok(text) => Some(text),
            Err(error) => {
                warn!(
                    event_name = "docs.document.failed",
                    document_id = %self.settings.document_id,
                    error = %error,
                    "could not read document"
                );
                None
            }
        }
    }

    async fn warm_up(&self) -> bool {
        match self.connect().await {
            Ok(()) => {
                info!(event_name = "docs.client.ready", "authenticated with document service");
                true
            }
            Err(error) => {
                warn!(
                    event_name = "docs.client.warm_up_failed",
                    error = %error,
                    "failed to authenticate with document service"
                );
                false
            }
        }
    }
}
