//! Google Docs access for the stats bot.
//!
//! - **Credentials** (`credentials`) - service account key loading and the
//!   signed JWT assertion
//! - **Tokens** (`token`) - jwt-bearer exchange with cached access tokens
//! - **Client** (`client`) - lazily opened, shared HTTP session that fetches
//!   the configured document and implements
//!   [`charstats_core::DocumentSource`]
//! - **Text** (`text`) - flattening of the Docs JSON structure to plain text

pub mod client;
pub mod credentials;
pub mod error;
pub mod text;
pub mod token;

pub use client::{DocsSettings, GoogleDocsClient};
pub use error::DocsError;
pub use token::{ServiceAccountTokenSource, TokenSource};
