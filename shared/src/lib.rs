use serde::{Deserialize, Serialize};
use std::fmt;

pub const DATA_SEPARATOR: char = '|';
pub const DEFAULT_BUFFER_SIZE: usize = 256;
pub const FIELD_COUNT: usize = 4;

pub const WAITING_TAG: &str = "waiting";
pub const START_TAG: &str = "start";
pub const PLAYING_TAG: &str = "playing";

/// Payload a client sends to declare (or withdraw) readiness.
pub const READY_COMMAND: &str = "ready";

/// One player's state as exchanged on the wire: `id|name|alive|score`.
///
/// Readiness is not part of the record; clients toggle it
/// with [`READY_COMMAND`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: u64,
    pub name: String,
    pub alive: bool,
    pub score: i64,
}

impl PlayerRecord {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            alive: true,
            score: 0,
        }
    }
}

impl fmt::Display for PlayerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

/// Joins the four record fields with [`DATA_SEPARATOR`].
///
/// The name is not escaped, so a name containing the separator produces a
/// record that will not decode.
pub fn encode(record: &PlayerRecord) -> String {
    format!(
        "{id}{sep}{name}{sep}{alive}{sep}{score}",
        id = record.id,
        name = record.name,
        alive = if record.alive { "1" } else { "0" },
        score = record.score,
        sep = DATA_SEPARATOR,
    )
}

/// Parses a single record, returning `None` for anything malformed.
///
/// Fixed-size reads leave NUL padding behind short payloads, so padding and
/// surrounding whitespace are stripped before splitting.
pub fn decode(text: &str) -> Option<PlayerRecord> {
    let fields: Vec<&str> = clean_payload(text).split(DATA_SEPARATOR).collect();
    record_from_fields(&fields)
}

fn record_from_fields(fields: &[&str]) -> Option<PlayerRecord> {
    if fields.len() != FIELD_COUNT {
        return None;
    }

    let id = fields[0].parse().ok()?;
    let alive = match fields[2] {
        "1" => true,
        "0" => false,
        _ => return None,
    };
    let score = fields[3].parse().ok()?;

    // Frames are newline-terminated, so a name may not carry line breaks
    let name = fields[1];
    if name.chars().any(char::is_control) {
        return None;
    }

    Some(PlayerRecord {
        id,
        name: name.to_string(),
        alive,
        score,
    })
}

/// Joins encoded records into one broadcast string, one segment per player.
pub fn join_records<'a>(records: impl IntoIterator<Item = &'a PlayerRecord>) -> String {
    let mut joined = String::new();
    for record in records {
        if !joined.is_empty() {
            joined.push(DATA_SEPARATOR);
        }
        joined.push_str(&encode(record));
    }
    joined
}

/// Builds an outbound frame: the status tag, then the broadcast (if any),
/// terminated by a newline.
pub fn status_frame(tag: &str, broadcast: &str) -> String {
    if broadcast.is_empty() {
        format!("{tag}\n")
    } else {
        format!("{tag}{DATA_SEPARATOR}{broadcast}\n")
    }
}

/// What a client meant by one fixed-size read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Nothing but padding or whitespace.
    Empty,
    Ready,
    Record(PlayerRecord),
    /// Looked like a record but failed to decode.
    Malformed(String),
    /// Anything else, handed to the gameplay layer while a match runs.
    Request(String),
}

impl ClientMessage {
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let text = clean_payload(&text);

        if text.is_empty() {
            ClientMessage::Empty
        } else if text == READY_COMMAND {
            ClientMessage::Ready
        } else if text.contains(DATA_SEPARATOR) {
            match decode(text) {
                Some(record) => ClientMessage::Record(record),
                None => ClientMessage::Malformed(text.to_string()),
            }
        } else {
            ClientMessage::Request(text.to_string())
        }
    }
}

fn clean_payload(text: &str) -> &str {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}
