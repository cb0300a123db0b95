use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_PANEL_FIELDS: usize = 24;
/// Hard ceiling imposed by the chat platform on fields per panel.
pub const PLATFORM_MAX_PANEL_FIELDS: usize = 25;

pub const DEFAULT_DOCS_API_BASE_URL: &str = "https://docs.googleapis.com";
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
pub const DEFAULT_CHAT_API_BASE_URL: &str = "https://discord.com/api/v10";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub document: DocumentConfig,
    pub display: DisplayConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub bot_token: SecretString,
    pub command_prefix: String,
    pub transport: ChatTransport,
    pub gateway_url: String,
    pub api_base_url: String,
}

/// Which gateway connection the server opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTransport {
    Discord,
    Noop,
}

#[derive(Clone, Debug)]
pub struct DocumentConfig {
    pub document_id: String,
    pub credentials_path: PathBuf,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DisplayConfig {
    pub max_fields: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
    pub command_prefix: Option<String>,
    pub chat_transport: Option<ChatTransport>,
    pub document_id: Option<String>,
    pub credentials_path: Option<PathBuf>,
    pub docs_api_base_url: Option<String>,
    pub max_fields: Option<usize>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chat: ChatConfig {
                bot_token: String::new().into(),
                command_prefix: "!".to_string(),
                transport: ChatTransport::Discord,
                gateway_url: DEFAULT_GATEWAY_URL.to_string(),
                api_base_url: DEFAULT_CHAT_API_BASE_URL.to_string(),
            },
            document: DocumentConfig {
                document_id: String::new(),
                credentials_path: PathBuf::from("service_account.json"),
                api_base_url: DEFAULT_DOCS_API_BASE_URL.to_string(),
                timeout_secs: 15,
            },
            display: DisplayConfig { max_fields: DEFAULT_MAX_PANEL_FIELDS },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for ChatTransport {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discord" => Ok(Self::Discord),
            "noop" => Ok(Self::Noop),
            other => Err(ConfigError::Validation(format!(
                "unsupported chat transport `{other}` (expected discord|noop)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = Self::load_layers(options)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads every layer but validates only the `document` section, for tools
    /// that read the stats document without connecting to chat.
    pub fn load_document(options: LoadOptions) -> Result<DocumentConfig, ConfigError> {
        let config = Self::load_layers(options)?;
        validate_document(&config.document)?;
        Ok(config.document)
    }

    fn load_layers(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("charstats.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(chat) = patch.chat {
            if let Some(bot_token_value) = chat.bot_token {
                self.chat.bot_token = secret_value(bot_token_value);
            }
            if let Some(command_prefix) = chat.command_prefix {
                self.chat.command_prefix = command_prefix;
            }
            if let Some(transport) = chat.transport {
                self.chat.transport = transport;
            }
            if let Some(gateway_url) = chat.gateway_url {
                self.chat.gateway_url = gateway_url;
            }
            if let Some(api_base_url) = chat.api_base_url {
                self.chat.api_base_url = api_base_url;
            }
        }

        if let Some(document) = patch.document {
            if let Some(document_id) = document.document_id {
                self.document.document_id = document_id;
            }
            if let Some(credentials_path) = document.credentials_path {
                self.document.credentials_path = credentials_path;
            }
            if let Some(api_base_url) = document.api_base_url {
                self.document.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = document.timeout_secs {
                self.document.timeout_secs = timeout_secs;
            }
        }

        if let Some(display) = patch.display {
            if let Some(max_fields) = display.max_fields {
                self.display.max_fields = max_fields;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let bot_token =
            read_env("CHARSTATS_CHAT_BOT_TOKEN").or_else(|| read_env("DISCORD_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.chat.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("CHARSTATS_CHAT_COMMAND_PREFIX") {
            self.chat.command_prefix = value;
        }
        if let Some(value) = read_env("CHARSTATS_CHAT_TRANSPORT") {
            self.chat.transport = value.parse()?;
        }
        if let Some(value) = read_env("CHARSTATS_CHAT_GATEWAY_URL") {
            self.chat.gateway_url = value;
        }
        if let Some(value) = read_env("CHARSTATS_CHAT_API_BASE_URL") {
            self.chat.api_base_url = value;
        }

        let document_id = read_env("CHARSTATS_DOCUMENT_ID").or_else(|| read_env("GOOGLE_DOC_ID"));
        if let Some(value) = document_id {
            self.document.document_id = value;
        }
        let credentials_path = read_env("CHARSTATS_DOCUMENT_CREDENTIALS_PATH")
            .or_else(|| read_env("GOOGLE_SERVICE_ACCOUNT_JSON_PATH"));
        if let Some(value) = credentials_path {
            self.document.credentials_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("CHARSTATS_DOCUMENT_API_BASE_URL") {
            self.document.api_base_url = value;
        }
        if let Some(value) = read_env("CHARSTATS_DOCUMENT_TIMEOUT_SECS") {
            self.document.timeout_secs = parse_u64("CHARSTATS_DOCUMENT_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CHARSTATS_DISPLAY_MAX_FIELDS") {
            self.display.max_fields = parse_usize("CHARSTATS_DISPLAY_MAX_FIELDS", &value)?;
        }

        if let Some(value) = read_env("CHARSTATS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CHARSTATS_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("CHARSTATS_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("CHARSTATS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CHARSTATS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CHARSTATS_LOGGING_LEVEL").or_else(|| read_env("CHARSTATS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CHARSTATS_LOGGING_FORMAT").or_else(|| read_env("CHARSTATS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.bot_token {
            self.chat.bot_token = secret_value(bot_token);
        }
        if let Some(command_prefix) = overrides.command_prefix {
            self.chat.command_prefix = command_prefix;
        }
        if let Some(transport) = overrides.chat_transport {
            self.chat.transport = transport;
        }
        if let Some(document_id) = overrides.document_id {
            self.document.document_id = document_id;
        }
        if let Some(credentials_path) = overrides.credentials_path {
            self.document.credentials_path = credentials_path;
        }
        if let Some(api_base_url) = overrides.docs_api_base_url {
            self.document.api_base_url = api_base_url;
        }
        if let Some(max_fields) = overrides.max_fields {
            self.display.max_fields = max_fields;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chat(&self.chat)?;
        validate_document(&self.document)?;
        validate_display(&self.display)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("charstats.toml"), PathBuf::from("config/charstats.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    let bot_token = chat.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.bot_token is required. Set CHARSTATS_CHAT_BOT_TOKEN (or DISCORD_BOT_TOKEN) to the bot user token".to_string(),
        ));
    }
    if bot_token.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "chat.bot_token must not contain whitespace (hint: remove any `Bot ` prefix or trailing newline)"
                .to_string(),
        ));
    }

    let prefix = chat.command_prefix.as_str();
    if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "chat.command_prefix must be a non-empty string without whitespace".to_string(),
        ));
    }

    let gateway_url = chat.gateway_url.as_str();
    if !gateway_url.starts_with("ws://") && !gateway_url.starts_with("wss://") {
        return Err(ConfigError::Validation(
            "chat.gateway_url must start with ws:// or wss://".to_string(),
        ));
    }

    let api_base_url = chat.api_base_url.as_str();
    if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "chat.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_document(document: &DocumentConfig) -> Result<(), ConfigError> {
    if document.document_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "document.document_id is required. Set CHARSTATS_DOCUMENT_ID (or GOOGLE_DOC_ID) to the id from the document URL".to_string(),
        ));
    }

    if document.credentials_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "document.credentials_path must point at a service account key file".to_string(),
        ));
    }

    let base_url = document.api_base_url.as_str();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "document.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if document.timeout_secs == 0 || document.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "document.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_display(display: &DisplayConfig) -> Result<(), ConfigError> {
    if display.max_fields == 0 || display.max_fields > PLATFORM_MAX_PANEL_FIELDS {
        return Err(ConfigError::Validation(format!(
            "display.max_fields must be in range 1..={PLATFORM_MAX_PANEL_FIELDS}"
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    chat: Option<ChatPatch>,
    document: Option<DocumentPatch>,
    display: Option<DisplayPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    bot_token: Option<String>,
    command_prefix: Option<String>,
    transport: Option<ChatTransport>,
    gateway_url: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentPatch {
    document_id: Option<String>,
    credentials_path: Option<PathBuf>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DisplayPatch {
    max_fields: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
