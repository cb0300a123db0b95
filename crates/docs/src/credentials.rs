//! Service account keys and the signed JWT assertion exchanged for an access
//! token.

use std::fs;
use std::path::Path;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::{DocsError, Result};

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only scopes needed to fetch document contents.
pub const DOCUMENT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/documents.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
];

/// Assertion lifetime accepted by the token endpoint.
const ASSERTION_TTL_SECS: i64 = 3600;

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|source| DocsError::ReadCredentials { path: path.to_path_buf(), source })?;
        serde_json::from_str(&raw)
            .map_err(|source| DocsError::ParseCredentials { path: path.to_path_buf(), source })
    }

    /// RS256-signed assertion for the jwt-bearer grant, issued at `issued_at`
    /// (unix seconds).
    pub fn signed_assertion(&self, scopes: &[&str], issued_at: i64) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: scopes.join(" "),
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_TTL_SECS,
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(encode(&header, &claims, &key)?)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use jsonwebtoken::{decode_header, Algorithm};

    use super::{ServiceAccountKey, DOCUMENT_SCOPES};
    use crate::error::DocsError;

    fn fixture_key() -> ServiceAccountKey {
        let path =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/service_account.json");
        ServiceAccountKey::from_file(&path).expect("fixture key should load")
    }

    #[test]
    fn signs_rs256_assertion_with_key_id() {
        let key = fixture_key();
        let assertion = key.signed_assertion(DOCUMENT_SCOPES, 1_700_000_000).expect("sign");

        let header = decode_header(&assertion).expect("header");
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("test-key-1"));
        assert_eq!(assertion.split('.').count(), 3);
    }

    #[test]
    fn debug_output_redacts_private_key() {
        let debug = format!("{:?}", fixture_key());
        assert!(!debug.contains("BEGIN PRIVATE KEY"));
        assert!(debug.contains("charstats-test@"));
    }

    #[test]
    fn missing_key_file_is_reported_with_path() {
        let error = ServiceAccountKey::from_file(Path::new("/nonexistent/charstats-key.json"))
            .expect_err("missing file");
        assert!(matches!(error, DocsError::ReadCredentials { .. }));
        assert!(error.to_string().contains("charstats-key.json"));
    }

    #[test]
    fn malformed_key_file_is_reported() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("key.json");
        std::fs::write(&path, "{\"client_email\": 5}").expect("write");

        let error = ServiceAccountKey::from_file(&path).expect_err("malformed");
        assert!(matches!(error, DocsError::ParseCredentials { .. }));
    }
}
