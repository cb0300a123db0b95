use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use charstats_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];

    let bot_token = redact_token(config.chat.bot_token.expose_secret());
    lines.push(render_line(
        "chat.bot_token",
        &bot_token,
        source("chat.bot_token", &["CHARSTATS_CHAT_BOT_TOKEN", "DISCORD_BOT_TOKEN"]),
    ));
    lines.push(render_line(
        "chat.command_prefix",
        &config.chat.command_prefix,
        source("chat.command_prefix", &["CHARSTATS_CHAT_COMMAND_PREFIX"]),
    ));
    lines.push(render_line(
        "chat.transport",
        &format!("{:?}", config.chat.transport),
        source("chat.transport", &["CHARSTATS_CHAT_TRANSPORT"]),
    ));
    lines.push(render_line(
        "chat.gateway_url",
        &config.chat.gateway_url,
        source("chat.gateway_url", &["CHARSTATS_CHAT_GATEWAY_URL"]),
    ));
    lines.push(render_line(
        "chat.api_base_url",
        &config.chat.api_base_url,
        source("chat.api_base_url", &["CHARSTATS_CHAT_API_BASE_URL"]),
    ));

    lines.push(render_line(
        "document.document_id",
        &config.document.document_id,
        source("document.document_id", &["CHARSTATS_DOCUMENT_ID", "GOOGLE_DOC_ID"]),
    ));
    lines.push(render_line(
        "document.credentials_path",
        &config.document.credentials_path.display().to_string(),
        source(
            "document.credentials_path",
            &["CHARSTATS_DOCUMENT_CREDENTIALS_PATH", "GOOGLE_SERVICE_ACCOUNT_JSON_PATH"],
        ),
    ));
    lines.push(render_line(
        "document.api_base_url",
        &config.document.api_base_url,
        source("document.api_base_url", &["CHARSTATS_DOCUMENT_API_BASE_URL"]),
    ));
    lines.push(render_line(
        "document.timeout_secs",
        &config.document.timeout_secs.to_string(),
        source("document.timeout_secs", &["CHARSTATS_DOCUMENT_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "display.max_fields",
        &config.display.max_fields.to_string(),
        source("display.max_fields", &["CHARSTATS_DISPLAY_MAX_FIELDS"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["CHARSTATS_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", &["CHARSTATS_SERVER_HEALTH_CHECK_PORT"]),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", &["CHARSTATS_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["CHARSTATS_LOGGING_LEVEL", "CHARSTATS_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["CHARSTATS_LOGGING_FORMAT", "CHARSTATS_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("charstats.toml"), PathBuf::from("config/charstats.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps only the first segment of a dotted bot token.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('.') {
        Some((head, _)) if !head.is_empty() => format!("{head}.***"),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn redacts_everything_after_first_token_segment() {
        assert_eq!(redact_token("MTIz.abc.def"), "MTIz.***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token(".abc"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn finds_nested_key_paths() {
        let doc: Value = "[display]\nmax_fields = 10\n".parse().expect("toml");
        assert!(contains_path(&doc, "display.max_fields"));
        assert!(!contains_path(&doc, "display.color"));
        assert!(!contains_path(&doc, "chat.bot_token"));
    }
}
