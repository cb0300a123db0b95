//! Discord gateway transport: a websocket session for events and the REST
//! API for replies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use charstats_core::config::ChatConfig;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::blocks::MessageTemplate;
use crate::commands::{Member, MessagePayload};
use crate::events::{ChatEnvelope, ChatEvent, ReadyEvent};
use crate::gateway::{GatewayTransport, TransportError};

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INTENT_GUILDS: u64 = 1 << 0;
const INTENT_GUILD_MEMBERS: u64 = 1 << 1;
const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

/// Guilds, members, guild messages and message content.
pub const DEFAULT_INTENTS: u64 =
    INTENT_GUILDS | INTENT_GUILD_MEMBERS | INTENT_GUILD_MESSAGES | INTENT_MESSAGE_CONTENT;

const CDN_BASE_URL: &str = "https://cdn.discordapp.com";
const REPLY_TIMEOUT: Duration = Duration::from_secs(15);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketStream = SplitStream<Socket>;

#[derive(Clone, Debug)]
pub struct DiscordSettings {
    pub bot_token: SecretString,
    pub gateway_url: String,
    pub api_base_url: String,
    pub intents: u64,
}

impl DiscordSettings {
    pub fn from_config(chat: &ChatConfig) -> Self {
        Self {
            bot_token: chat.bot_token.clone(),
            gateway_url: chat.gateway_url.clone(),
            api_base_url: chat.api_base_url.trim_end_matches('/').to_owned(),
            intents: DEFAULT_INTENTS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayFrame {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct ReadyData {
    user: UserData,
    #[serde(default)]
    guilds: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
    author: UserData,
    #[serde(default)]
    mentions: Vec<UserData>,
}

struct Session {
    sink: Arc<Mutex<SocketSink>>,
    heartbeat: JoinHandle<()>,
}

/// Live connection to the Discord gateway.
///
/// Each `connect` opens a fresh session (HELLO, IDENTIFY, heartbeat task).
/// Reconnect requests, invalid sessions and dropped sockets surface as
/// [`TransportError::Closed`] so the runner opens a new one.
pub struct DiscordGatewayTransport {
    settings: DiscordSettings,
    http: reqwest::Client,
    /// Last dispatch sequence plus one; zero before the first dispatch.
    sequence: Arc<AtomicU64>,
    stream: Mutex<Option<SocketStream>>,
    session: Mutex<Option<Session>>,
}

impl DiscordGatewayTransport {
    pub fn new(settings: DiscordSettings) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(REPLY_TIMEOUT)
            .build()
            .map_err(|error| TransportError::Connect(format!("http client: {error}")))?;

        Ok(Self {
            settings,
            http,
            sequence: Arc::new(AtomicU64::new(0)),
            stream: Mutex::new(None),
            session: Mutex::new(None),
        })
    }

    async fn send_heartbeat(&self) -> Result<(), TransportError> {
        let sink = match self.session.lock().await.as_ref() {
            Some(session) => session.sink.clone(),
            None => return Err(TransportError::Closed("no active session".to_owned())),
        };
        let payload = heartbeat_payload(last_sequence(&self.sequence));

        let mut sink = sink.lock().await;
        sink.send(Message::Text(payload.to_string()))
            .await
            .map_err(|error| TransportError::Closed(format!("heartbeat failed: {error}")))
    }
}

#[async_trait]
impl GatewayTransport for DiscordGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if let Err(error) = self.disconnect().await {
            debug!(error = %error, "previous gateway session did not close cleanly");
        }

        let (socket, _) = connect_async(self.settings.gateway_url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let interval = read_hello(&mut stream).await?;
        self.sequence.store(0, Ordering::SeqCst);

        let identify =
            identify_payload(self.settings.bot_token.expose_secret(), self.settings.intents);
        sink.send(Message::Text(identify.to_string()))
            .await
            .map_err(|error| TransportError::Connect(format!("identify failed: {error}")))?;

        let sink = Arc::new(Mutex::new(sink));
        let heartbeat = tokio::spawn(heartbeat_loop(sink.clone(), self.sequence.clone(), interval));

        *self.stream.lock().await = Some(stream);
        *self.session.lock().await = Some(Session { sink, heartbeat });

        info!(
            event_name = "chat.gateway.identified",
            heartbeat_interval_ms = interval.as_millis() as u64,
            intents = self.settings.intents,
            "sent gateway identify"
        );
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Receive("gateway is not connected".to_owned()));
        };

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => {
                    return Err(TransportError::Closed(format!("gateway read failed: {error}")));
                }
                None => return Err(TransportError::Closed("gateway stream ended".to_owned())),
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => return Err(TransportError::Closed(close_reason(frame))),
                _ => continue,
            };

            let frame: GatewayFrame = match serde_json::from_str(&text) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(error = %error, "skipping malformed gateway frame");
                    continue;
                }
            };
            if let Some(sequence) = frame.s {
                self.sequence.store(sequence.saturating_add(1), Ordering::SeqCst);
            }

            match frame.op {
                OP_DISPATCH => return Ok(Some(envelope_from_dispatch(&frame))),
                OP_HEARTBEAT => self.send_heartbeat().await?,
                OP_RECONNECT => {
                    return Err(TransportError::Closed("gateway requested reconnect".to_owned()));
                }
                OP_INVALID_SESSION => {
                    let reason = "gateway invalidated the session".to_owned();
                    return Err(TransportError::Closed(reason));
                }
                OP_HEARTBEAT_ACK => debug!("gateway heartbeat acknowledged"),
                other => debug!(op = other, "ignoring gateway opcode"),
            }
        }
    }

    async fn reply(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        let url = format!("{}/channels/{channel_id}/messages", self.settings.api_base_url);
        let response = self
            .http
            .post(url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.settings.bot_token.expose_secret()),
            )
            .json(message)
            .send()
            .await
            .map_err(|error| TransportError::Reply(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Reply(format!("status {}: {body}", status.as_u16())));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        session.heartbeat.abort();

        let result = session.sink.lock().await.close().await;
        // a reader parked on the stream sees the close frame and releases it
        if let Ok(mut stream) = self.stream.try_lock() {
            stream.take();
        }

        match result {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(error) => Err(TransportError::Disconnect(error.to_string())),
        }
    }
}

async fn read_hello(stream: &mut SocketStream) -> Result<Duration, TransportError> {
    while let Some(message) = stream.next().await {
        let message = message.map_err(|error| TransportError::Connect(error.to_string()))?;
        let Message::Text(text) = message else {
            continue;
        };

        let frame: GatewayFrame = serde_json::from_str(&text)
            .map_err(|error| TransportError::Connect(format!("malformed hello: {error}")))?;
        if frame.op != OP_HELLO {
            return Err(TransportError::Connect(format!("expected hello, got opcode {}", frame.op)));
        }

        let interval = frame.d["heartbeat_interval"].as_u64().ok_or_else(|| {
            TransportError::Connect("hello frame has no heartbeat_interval".to_owned())
        })?;
        return Ok(Duration::from_millis(interval.max(1)));
    }

    Err(TransportError::Connect("gateway closed before hello".to_owned()))
}

async fn heartbeat_loop(sink: Arc<Mutex<SocketSink>>, sequence: Arc<AtomicU64>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let payload = heartbeat_payload(last_sequence(&sequence));
        if let Err(error) = sink.lock().await.send(Message::Text(payload.to_string())).await {
            warn!(error = %error, "gateway heartbeat failed; stopping heartbeat task");
            return;
        }
    }
}

fn last_sequence(sequence: &AtomicU64) -> Option<u64> {
    sequence.load(Ordering::SeqCst).checked_sub(1)
}

fn heartbeat_payload(sequence: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

fn identify_payload(token: &str, intents: u64) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "charstats",
                "device": "charstats"
            }
        }
    })
}

fn close_reason(frame: Option<CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) => {
            format!("gateway closed the socket ({}: {})", u16::from(frame.code), frame.reason)
        }
        None => "gateway closed the socket".to_owned(),
    }
}

fn envelope_from_dispatch(frame: &GatewayFrame) -> ChatEnvelope {
    let event_type = frame.t.clone().unwrap_or_default();
    let fallback_id = match frame.s {
        Some(sequence) => format!("seq-{sequence}"),
        None => "gateway-event".to_owned(),
    };
    let unsupported = |envelope_id: String| ChatEnvelope {
        envelope_id,
        event: ChatEvent::Unsupported { event_type: event_type.clone() },
    };

    match event_type.as_str() {
        "READY" => match ReadyData::deserialize(&frame.d) {
            Ok(ready) => ChatEnvelope {
                envelope_id: fallback_id,
                event: ChatEvent::Ready(ReadyEvent {
                    bot_name: ready.user.username,
                    guild_count: ready.guilds.len(),
                }),
            },
            Err(error) => {
                warn!(error = %error, "malformed READY payload");
                unsupported(fallback_id)
            }
        },
        "MESSAGE_CREATE" => match MessageData::deserialize(&frame.d) {
            Ok(message) if message.author.bot => unsupported(format!("msg-{}", message.id)),
            Ok(message) => ChatEnvelope {
                envelope_id: format!("msg-{}", message.id),
                event: ChatEvent::MessageCreate(MessagePayload {
                    message_id: message.id,
                    channel_id: message.channel_id,
                    author_id: message.author.id,
                    content: message.content,
                    mentions: message.mentions.into_iter().map(member_from_user).collect(),
                }),
            },
            Err(error) => {
                warn!(error = %error, "malformed MESSAGE_CREATE payload");
                unsupported(fallback_id)
            }
        },
        _ => unsupported(fallback_id),
    }
}

fn member_from_user(user: UserData) -> Member {
    let discriminator = user.discriminator.unwrap_or_else(|| "0".to_owned());
    let avatar_url = avatar_url(&user.id, user.avatar.as_deref(), &discriminator);
    Member { id: user.id, name: user.username, discriminator, avatar_url: Some(avatar_url) }
}

/// Custom avatar when set, otherwise the platform's default avatar for the user.
pub fn avatar_url(user_id: &str, avatar: Option<&str>, discriminator: &str) -> String {
    if let Some(hash) = avatar {
        return format!("{CDN_BASE_URL}/avatars/{user_id}/{hash}.png");
    }

    let index = if discriminator == "0" {
        user_id.parse::<u64>().map(|id| (id >> 22) % 6).unwrap_or(0)
    } else {
        discriminator.parse::<u64>().map(|value| value % 5).unwrap_or(0)
    };
    format!("{CDN_BASE_URL}/embed/avatars/{index}.png")
}
