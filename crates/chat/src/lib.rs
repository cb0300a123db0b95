//! Chat bot interface for character stats
//!
//! This crate provides the chat-facing side of charstats:
//! - **Gateway** (`gateway`) - event loop over a platform connection with reconnection logic
//! - **Discord** (`discord`) - websocket gateway session and REST replies
//! - **Commands** (`commands`) - `!charstats @Username` parsing and routing
//! - **Events** (`events`) - ready and message-create handlers
//! - **Embeds** (`blocks`) - message and stats panel builders
//! - **Lookup** (`lookup`) - document fetch, record search and panel rendering per command
//!
//! # Architecture
//!
//! ```text
//! Gateway events → EventDispatcher → StatsCommandHandler → StatsLookupService
//!                        ↓                                      ↓
//!                 Reply embed  ←  StatsCard  ←  find_record ← DocumentSource
//! ```
//!
//! # Key Types
//!
//! - `GatewayRunner` - gateway event loop with reconnection logic
//! - `DiscordGatewayTransport` - live `GatewayTransport` for Discord
//! - `EventDispatcher` - routes events to handlers
//! - `StatsCard` - renders a stat record as a capped embed panel
//! - `StatsCommandService` - trait behind the `charstats` command

pub mod blocks;
pub mod commands;
pub mod discord;
pub mod events;
pub mod gateway;
pub mod lookup;
