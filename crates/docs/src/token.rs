use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::credentials::{ServiceAccountKey, DOCUMENT_SCOPES};
use crate::error::{DocsError, Result};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed this long before the issuer's stated expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound on how long an issued token is cached, whatever `expires_in` says.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Supplies bearer tokens for document requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self, http: &reqwest::Client) -> Result<String>;

    /// Drops any cached token so the next call re-authenticates.
    async fn invalidate(&self);
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

struct TokenState {
    key: Option<ServiceAccountKey>,
    token: Option<CachedToken>,
}

/// Exchanges a service account key for access tokens and caches them until
/// shortly before they expire.
pub struct ServiceAccountTokenSource {
    key_path: PathBuf,
    state: Mutex<TokenState>,
}

impl ServiceAccountTokenSource {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self { key_path: key_path.into(), state: Mutex::new(TokenState { key: None, token: None }) }
    }

    async fn exchange(
        &self,
        key: &ServiceAccountKey,
        http: &reqwest::Client,
    ) -> Result<CachedToken> {
        let assertion = key.signed_assertion(DOCUMENT_SCOPES, Utc::now().timestamp())?;
        let response = http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocsError::TokenRejected { status: status.as_u16(), body });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in)
            .min(MAX_TOKEN_LIFETIME)
            .saturating_sub(EXPIRY_MARGIN);
        info!(
            event_name = "docs.token.issued",
            client_email = %key.client_email,
            expires_in = token.expires_in,
            "obtained document access token"
        );

        let now = Instant::now();
        let refresh_at = now.checked_add(lifetime).unwrap_or(now);
        Ok(CachedToken { value: token.access_token, refresh_at })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self, http: &reqwest::Client) -> Result<String> {
        // held across the exchange so concurrent callers share one refresh
        let mut state = self.state.lock().await;

        if let Some(token) = &state.token {
            if Instant::now() < token.refresh_at {
                debug!(event_name = "docs.token.cached", "reusing cached access token");
                return Ok(token.value.clone());
            }
        }

        let key = match state.key.clone() {
            Some(key) => key,
            None => {
                debug!(
                    event_name = "docs.credentials.load",
                    path = %self.key_path.display(),
                    "loading service account key"
                );
                let key = ServiceAccountKey::from_file(&self.key_path)?;
                state.key = Some(key.clone());
                key
            }
        };

        let token = self.exchange(&key, http).await?;
        let value = token.value.clone();
        state.token = Some(token);
        Ok(value)
    }

    async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.token = None;
        state.key = None;
    }
}
