//! Line-oriented admin console
//!
//! Operators type one command per line on the server's stdin:
//! `start`, `stop`, `userinfo`, `rooms` and `exit`. The console only reads
//! server state through its accessors and toggles listening; it never
//! touches rooms directly.

use crate::network::Server;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    UserInfo,
    Rooms,
    Exit,
    Empty,
    Unknown(String),
}

impl Command {
    /// Parses the first word of a line; extra words are ignored
    pub fn parse(line: &str) -> Self {
        match line.split_whitespace().next() {
            None => Command::Empty,
            Some("start") => Command::Start,
            Some("stop") => Command::Stop,
            Some("userinfo") => Command::UserInfo,
            Some("rooms") => Command::Rooms,
            Some("exit") => Command::Exit,
            Some(other) => Command::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Exit,
}

pub async fn execute(server: &Server, command: Command) -> Reply {
    let output = match command {
        Command::Start => match server.begin_listening().await {
            Ok(addr) => format!("Started listening for incoming clients on {addr}"),
            Err(e) => format!("Could not start listening: {e}"),
        },
        Command::Stop => match server.stop() {
            Ok(()) => "Stopped listening for incoming clients".to_string(),
            Err(e) => format!("Could not stop: {e}"),
        },
        Command::UserInfo => format!("Users connected: {}", server.connected_players()),
        Command::Rooms => list_rooms(server),
        Command::Exit => return Reply::Exit,
        Command::Empty => String::new(),
        Command::Unknown(_) => "Invalid command".to_string(),
    };
    Reply::Output(output)
}

/// One JSON object per room, in creation order
fn list_rooms(server: &Server) -> String {
    let rooms = server.rooms();
    if rooms.is_empty() {
        return "No rooms".to_string();
    }

    rooms
        .iter()
        .map(|room| {
            serde_json::to_string(room)
                .unwrap_or_else(|e| format!("room {}: unprintable ({e})", room.id))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
