use std::path::{Path, PathBuf};
use std::time::Duration;

use charstats_core::{find_record, DocumentSource};
use charstats_docs::{DocsSettings, GoogleDocsClient};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn key_file_with_token_uri(dir: &TempDir, token_uri: &str) -> PathBuf {
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/service_account.json");
    let raw = std::fs::read_to_string(fixture).expect("fixture");
    let mut key: Value = serde_json::from_str(&raw).expect("fixture json");
    key["token_uri"] = Value::String(token_uri.to_string());

    let path = dir.path().join("service_account.json");
    std::fs::write(&path, key.to_string()).expect("write key");
    path
}

fn paragraph(runs: &[&str]) -> Value {
    let elements: Vec<Value> =
        runs.iter().map(|run| json!({ "textRun": { "content": run } })).collect();
    json!({ "paragraph": { "elements": elements } })
}

async fn mount_google(server: &MockServer, document: Value, expected_exchanges: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.flow",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(expected_exchanges)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/documents/doc-flow"))
        .and(header("authorization", "Bearer ya29.flow"))
        .and(query_param("fields", "body(content(paragraph(elements(textRun(content)))))"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

fn client(server: &MockServer, key_path: PathBuf) -> GoogleDocsClient {
    GoogleDocsClient::new(DocsSettings {
        document_id: "doc-flow".to_string(),
        credentials_path: key_path,
        api_base_url: server.uri(),
        timeout: Duration::from_secs(5),
    })
}

#[tokio::test]
async fn signed_exchange_fetch_and_parse_end_to_end() {
    let server = MockServer::start().await;
    mount_google(
        &server,
        json!({
            "body": { "content": [
                { "sectionBreak": {} },
                paragraph(&["Player: @alice#0001\n"]),
                paragraph(&["Character ", "Name: Zara\n"]),
                paragraph(&["HP: 10\n"]),
                paragraph(&["X_X_X\n"]),
                paragraph(&["Player: @bob#0002\n", "HP: 5\n"])
            ] }
        }),
        1,
    )
    .await;

    let dir = TempDir::new().expect("tempdir");
    let key_path = key_file_with_token_uri(&dir, &format!("{}/token", server.uri()));
    let docs = client(&server, key_path);

    assert!(docs.warm_up().await, "warm up should exchange a token");

    let text = docs.fetch_document_text().await.expect("document text");
    let alice = find_record(&text, "@alice#0001").expect("alice block");
    assert_eq!(alice.character_name(), Some("Zara"));
    assert_eq!(alice.get("HP"), Some("10"));

    let text = docs.fetch_document_text().await.expect("second fetch reuses token");
    let bob = find_record(&text, "@bob#0002").expect("bob block");
    assert_eq!(bob.get("HP"), Some("5"));
    assert_eq!(bob.len(), 2);

    docs.shutdown().await;
    assert_eq!(docs.fetch_document_text().await, None, "closed client must not fetch");
}

#[tokio::test]
async fn rejected_credentials_collapse_to_unavailable_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let key_path = key_file_with_token_uri(&dir, &format!("{}/token", server.uri()));
    let docs = client(&server, key_path);

    assert!(!docs.warm_up().await);
    assert_eq!(docs.fetch_document_text().await, None);
}
