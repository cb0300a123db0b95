//! Core of the character stats bot: the stat-sheet record parser, layered
//! configuration, and the [`DocumentSource`] seam used by the chat layer.

pub mod config;
pub mod document;
pub mod record;

pub use document::{DocumentSource, StaticDocument};
pub use record::{
    find_record, header_line, StatRecord, CHARACTER_NAME_KEY, PLAYER_KEY, RECORD_DELIMITER,
};
