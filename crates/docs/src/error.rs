use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocsError {
    #[error("could not read service account key `{path}`: {source}")]
    ReadCredentials { path: PathBuf, source: std::io::Error },
    #[error("service account key `{path}` is malformed: {source}")]
    ParseCredentials { path: PathBuf, source: serde_json::Error },
    #[error("could not sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("http client failure: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint rejected the assertion (HTTP {status}): {body}")]
    TokenRejected { status: u16, body: String },
    #[error("document request failed (HTTP {status})")]
    DocumentStatus { status: u16 },
    #[error("document client has been shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, DocsError>;
