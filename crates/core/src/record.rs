//! Character stat records embedded in a shared plain-text document.
//!
//! The document is a flat blob of blocks separated by [`RECORD_DELIMITER`].
//! Each block opens with a header line `Player: <identity>` followed by
//! `key: value` field lines:
//!
//! ```text
//! Player: @alice#0001
//! Character Name: Zara
//! HP: 10
//! X_X_X
//! Player: @bob#0002
//! HP: 5
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

pub const RECORD_DELIMITER: &str = "X_X_X";
pub const PLAYER_KEY: &str = "Player";
pub const CHARACTER_NAME_KEY: &str = "Character Name";

/// The exact header line that binds a block to `identity`.
pub fn header_line(identity: &str) -> String {
    format!("{PLAYER_KEY}: {identity}")
}

/// Ordered key/value fields parsed from one record block.
///
/// Keys keep the position of their first occurrence; a repeated key replaces
/// the value in place. `Player` is always present and always equals the
/// identity the record was matched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatRecord {
    fields: Vec<(String, String)>,
}

impl StatRecord {
    fn for_player(identity: &str) -> Self {
        let mut record = Self { fields: Vec::new() };
        record.insert(PLAYER_KEY, identity);
        record
    }

    fn insert(&mut self, key: &str, value: &str) {
        match self.fields.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, slot)) => *slot = value.to_owned(),
            None => self.fields.push((key.to_owned(), value.to_owned())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(existing, _)| existing == key).map(|(_, value)| value.as_str())
    }

    pub fn player(&self) -> &str {
        self.get(PLAYER_KEY).unwrap_or_default()
    }

    pub fn character_name(&self) -> Option<&str> {
        self.get(CHARACTER_NAME_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for StatRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Finds the first block whose header is exactly `Player: <identity>` and
/// parses its field lines.
///
/// Returns `None` when the document is empty or no block matches. Lines
/// without a colon are skipped; a line is split on its first colon only.
pub fn find_record(document: &str, identity: &str) -> Option<StatRecord> {
    if document.is_empty() {
        return None;
    }

    let target = header_line(identity);
    debug!(event_name = "core.record.search", header = %target, "searching for player block");

    for block in document.split(RECORD_DELIMITER) {
        let mut lines = block.trim().split('\n');
        let Some(header) = lines.next().map(str::trim) else {
            continue;
        };
        if header.is_empty() {
            continue;
        }

        debug!(event_name = "core.record.block", header, "checking block");
        if header != target {
            continue;
        }

        let record = parse_fields(identity, lines);
        debug!(
            event_name = "core.record.matched",
            identity,
            field_count = record.len(),
            "parsed player block"
        );
        return Some(record);
    }

    debug!(event_name = "core.record.not_found", identity, "no player block matched");
    None
}

fn parse_fields<'a>(identity: &str, lines: impl Iterator<Item = &'a str>) -> StatRecord {
    let mut record = StatRecord::for_player(identity);

    for line in lines {
        if let Some((key, value)) = line.trim().split_once(':') {
            record.insert(key.trim(), value.trim());
        }
    }

    // a literal `Player:` line in the body never replaces the matched identity
    record.insert(PLAYER_KEY, identity);
    record
}
